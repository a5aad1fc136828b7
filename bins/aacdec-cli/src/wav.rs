//! PCM 输出: WAV (RIFF WAVE) 或裸 PCM.
//!
//! WAV 写入流程:
//! 1. 创建时写入 RIFF 与 fmt 块, data 块大小先填 0
//! 2. 逐帧追加 16 位小端 PCM
//! 3. `finish()` 回填 RIFF 大小与 data 块大小

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

/// WAV 音频格式码: PCM 整数
const WAV_FORMAT_PCM: u16 = 0x0001;
/// RIFF 大小字段的偏移
const RIFF_SIZE_OFFSET: u64 = 4;
/// data 块大小字段的偏移: 12 (RIFF) + 24 (fmt) + 4 (data 标签)
const DATA_SIZE_OFFSET: u64 = 40;
const BITS_PER_SAMPLE: u16 = 16;

/// 16 位 PCM WAV 写入器
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    data_written: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut inner: W, sample_rate: u32, channels: u16) -> io::Result<Self> {
        let block_align = channels * (BITS_PER_SAMPLE / 8);
        let byte_rate = sample_rate * u32::from(block_align);

        inner.write_all(b"RIFF")?;
        inner.write_all(&0u32.to_le_bytes())?;
        inner.write_all(b"WAVE")?;

        inner.write_all(b"fmt ")?;
        inner.write_all(&16u32.to_le_bytes())?;
        inner.write_all(&WAV_FORMAT_PCM.to_le_bytes())?;
        inner.write_all(&channels.to_le_bytes())?;
        inner.write_all(&sample_rate.to_le_bytes())?;
        inner.write_all(&byte_rate.to_le_bytes())?;
        inner.write_all(&block_align.to_le_bytes())?;
        inner.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

        inner.write_all(b"data")?;
        inner.write_all(&0u32.to_le_bytes())?;

        debug!("WAV 写入头部: {sample_rate} Hz, {channels} 声道, {BITS_PER_SAMPLE} 位");
        Ok(Self {
            inner,
            data_written: 0,
        })
    }

    /// 追加交错样本
    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.inner.write_all(&bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// 回填大小字段, 返回底层写入器
    pub fn finish(mut self) -> io::Result<W> {
        let data_size = u32::try_from(self.data_written).unwrap_or(u32::MAX);
        let riff_size = data_size.saturating_add(36);

        self.inner.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.inner.write_all(&riff_size.to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.inner.write_all(&data_size.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;

        debug!("WAV 写入尾部: riff_size={riff_size}, data_size={data_size}");
        Ok(self.inner)
    }
}

/// 解码输出目标
pub enum PcmSink {
    Wav(WavWriter<BufWriter<File>>),
    /// 无头部的 16 位小端 PCM
    Raw(BufWriter<File>),
}

impl PcmSink {
    /// 按首帧的格式创建输出文件
    pub fn create(path: &Path, raw: bool, sample_rate: u32, channels: u16) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        if raw {
            Ok(Self::Raw(file))
        } else {
            Ok(Self::Wav(WavWriter::new(file, sample_rate, channels)?))
        }
    }

    /// 追加交错样本
    pub fn write(&mut self, samples: &[i16]) -> io::Result<()> {
        match self {
            Self::Wav(wav) => wav.write_samples(samples),
            Self::Raw(file) => {
                let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                file.write_all(&bytes)
            }
        }
    }

    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Wav(wav) => wav.finish().map(drop),
            Self::Raw(mut file) => file.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    #[test]
    fn test_wav_头部回填() {
        let mut wav = WavWriter::new(Cursor::new(Vec::new()), 44100, 2).unwrap();
        wav.write_samples(&[1, -1, 0x1234, -32768]).unwrap();
        let data = wav.finish().unwrap().into_inner();

        assert_eq!(data.len(), 44 + 8);
        assert_eq!(&data[..4], b"RIFF");
        assert_eq!(u32_at(&data, 4), 36 + 8);
        assert_eq!(&data[8..16], b"WAVEfmt ");
        assert_eq!(u32_at(&data, 24), 44100);
        assert_eq!(u32_at(&data, 28), 44100 * 4);
        assert_eq!(&data[36..40], b"data");
        assert_eq!(u32_at(&data, 40), 8);
        assert_eq!(&data[44..], &[1, 0, 0xFF, 0xFF, 0x34, 0x12, 0x00, 0x80]);
    }

    #[test]
    fn test_写入文件() {
        let dir = tempfile::tempdir().unwrap();
        let samples = [100i16, -100, 7];

        let wav_path = dir.path().join("out.wav");
        let mut sink = PcmSink::create(&wav_path, false, 22050, 1).unwrap();
        sink.write(&samples).unwrap();
        sink.write(&samples).unwrap();
        sink.finish().unwrap();
        let data = std::fs::read(&wav_path).unwrap();
        assert_eq!(data.len(), 44 + 12);
        assert_eq!(u32_at(&data, 40), 12);
        assert_eq!(u32_at(&data, 24), 22050);

        let raw_path = dir.path().join("out.pcm");
        let mut sink = PcmSink::create(&raw_path, true, 22050, 1).unwrap();
        sink.write(&samples).unwrap();
        sink.finish().unwrap();
        assert_eq!(
            std::fs::read(&raw_path).unwrap(),
            vec![100, 0, 0x9C, 0xFF, 7, 0]
        );
    }
}
