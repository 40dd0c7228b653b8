use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::TRANSFER_BUFFER_SIZE;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct PcmInfo: u32 {
        const MMAP = 1 << 0;
        const MMAP_VALID = 1 << 1;
        const INTERLEAVED = 1 << 8;
        const BLOCK_TRANSFER = 1 << 16;
    }
}

bitflags! {
    /// One bit per sample format, indexed by the format number.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct FormatMask: u64 {
        const U8 = 1 << SampleFormat::U8 as u8;
        const S16_LE = 1 << SampleFormat::S16Le as u8;
        const S24_LE = 1 << SampleFormat::S24Le as u8;
        const S32_LE = 1 << SampleFormat::S32Le as u8;
        const FLOAT_LE = 1 << SampleFormat::FloatLe as u8;
        const S24_3LE = 1 << SampleFormat::S24_3Le as u8;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    pub struct RateMask: u32 {
        const RATE_5512 = 1 << 0;
        const RATE_8000 = 1 << 1;
        const RATE_11025 = 1 << 2;
        const RATE_16000 = 1 << 3;
        const RATE_22050 = 1 << 4;
        const RATE_32000 = 1 << 5;
        const RATE_44100 = 1 << 6;
        const RATE_48000 = 1 << 7;
        const RATE_64000 = 1 << 8;
        const RATE_88200 = 1 << 9;
        const RATE_96000 = 1 << 10;
        const RATE_176400 = 1 << 11;
        const RATE_192000 = 1 << 12;
    }
}

impl RateMask {
    pub fn from_rate(rate: u32) -> Option<Self> {
        Some(match rate {
            5512 => Self::RATE_5512,
            8000 => Self::RATE_8000,
            11025 => Self::RATE_11025,
            16000 => Self::RATE_16000,
            22050 => Self::RATE_22050,
            32000 => Self::RATE_32000,
            44100 => Self::RATE_44100,
            48000 => Self::RATE_48000,
            64000 => Self::RATE_64000,
            88200 => Self::RATE_88200,
            96000 => Self::RATE_96000,
            176400 => Self::RATE_176400,
            192000 => Self::RATE_192000,
            _ => return None,
        })
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SampleFormat {
    U8 = 1,
    S16Le = 2,
    /// 24 bits in a 4 byte container.
    S24Le = 6,
    S32Le = 10,
    FloatLe = 14,
    /// 24 bits packed into 3 bytes.
    S24_3Le = 32,
}

impl SampleFormat {
    pub fn mask(self) -> FormatMask {
        FormatMask::from_bits_retain(1 << self as u8)
    }

    /// Bytes one sample occupies in the interleaved stream.
    pub fn physical_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16Le => 2,
            Self::S24_3Le => 3,
            Self::S24Le | Self::S32Le | Self::FloatLe => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HwParams {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
    pub period_bytes: usize,
    pub periods: usize,
}

impl HwParams {
    pub fn frame_bytes(&self) -> usize {
        self.format.physical_bytes() * self.channels as usize
    }
    /// Size of the PCM ring.
    pub fn buffer_bytes(&self) -> usize {
        self.period_bytes * self.periods
    }
    pub fn period_frames(&self) -> usize {
        self.period_bytes / self.frame_bytes()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PcmHardware {
    pub info: PcmInfo,
    pub formats: FormatMask,
    pub rates: RateMask,
    pub rate_min: u32,
    pub rate_max: u32,
    pub channels_min: u32,
    pub channels_max: u32,
    pub buffer_bytes_max: usize,
    pub period_bytes_min: usize,
    pub period_bytes_max: usize,
    pub periods_min: usize,
    pub periods_max: usize,
}

pub const JAMVOX_MAX_CHANNELS: u32 = 2;

pub const JAMVOX_PCM_HW: PcmHardware = PcmHardware {
    info: PcmInfo::MMAP
        .union(PcmInfo::INTERLEAVED)
        .union(PcmInfo::BLOCK_TRANSFER)
        .union(PcmInfo::MMAP_VALID),
    formats: FormatMask::S16_LE.union(FormatMask::S24_3LE),
    rates: RateMask::RATE_44100.union(RateMask::RATE_48000),
    rate_min: 44100,
    rate_max: 48000,
    channels_min: 1,
    channels_max: JAMVOX_MAX_CHANNELS,
    buffer_bytes_max: TRANSFER_BUFFER_SIZE * 4,
    period_bytes_min: 64,
    period_bytes_max: TRANSFER_BUFFER_SIZE,
    periods_min: 2,
    periods_max: 32,
};

impl PcmHardware {
    /// Checks `params` against the hardware limits.
    pub fn constrain(&self, params: &HwParams) -> Result<()> {
        if !self.formats.contains(params.format.mask()) {
            return Err(Error::UnsupportedParameters("sample format"));
        }
        let rate_supported = RateMask::from_rate(params.rate)
            .map_or(false, |rate| self.rates.contains(rate));
        if !rate_supported || params.rate < self.rate_min || params.rate > self.rate_max {
            return Err(Error::UnsupportedParameters("sample rate"));
        }
        if params.channels < self.channels_min || params.channels > self.channels_max {
            return Err(Error::UnsupportedParameters("channel count"));
        }
        if params.period_bytes < self.period_bytes_min
            || params.period_bytes > self.period_bytes_max
        {
            return Err(Error::UnsupportedParameters("period size"));
        }
        if params.periods < self.periods_min || params.periods > self.periods_max {
            return Err(Error::UnsupportedParameters("period count"));
        }
        if params.buffer_bytes() > self.buffer_bytes_max {
            return Err(Error::UnsupportedParameters("buffer size"));
        }
        // keeps the hardware pointer on a frame boundary
        if params.period_bytes % params.frame_bytes() != 0 {
            return Err(Error::UnsupportedParameters("period not a whole number of frames"));
        }
        Ok(())
    }
}
