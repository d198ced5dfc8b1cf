#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod compression_tests {
    use anyhow::Result;
    use serde::{Deserialize, Serialize};
    use stagecommit::compression::{CompressionCodec, EncodedWrite, auto_detect_reader, register_codec};
    use stagecommit::config::OUTPUT_COMPRESSION;
    use stagecommit::format::read_jsonl_part;
    use stagecommit::testing::*;
    use stagecommit::*;
    use std::io::{self, Read, Write};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    fn sample_data() -> Vec<(u32, Reading)> {
        (0..50)
            .map(|i| {
                (
                    i,
                    Reading {
                        sensor: format!("s{}", i % 4),
                        value: f64::from(i) * 0.5,
                    },
                )
            })
            .collect()
    }

    fn write_compressed(codec: &str) -> Result<(MemoryFileSystem, PathBuf)> {
        let conf = Configuration::for_output_dir("out").with(OUTPUT_COMPRESSION, codec);
        let (fs, sink) = memory_sink_with::<u32, Reading>("jsonl", conf)?;
        let mut task = sink.open(0, 1)?;
        for record in sample_data() {
            task.write(&record)?;
        }
        let commit = task.close()?;
        sink.finalize_global(1)?;
        match commit.outcome {
            TaskOutcome::Committed { path } => Ok((fs, path)),
            TaskOutcome::NothingToCommit => anyhow::bail!("nothing committed"),
        }
    }

    fn assert_codec_round_trip(codec: &str, extension: &str, magic: &[u8]) -> Result<()> {
        let (fs, path) = write_compressed(codec)?;
        assert_eq!(path, PathBuf::from(format!("out/1{extension}")));
        assert_parts(&fs, "out", &[1]);
        assert_job_committed(&fs, "out");

        let raw = fs.contents(&path).expect("committed part");
        assert!(raw.starts_with(magic), "{codec} part lacks its magic bytes");

        let back: Vec<(u32, Reading)> = read_jsonl_part(&fs, &path)?;
        assert_eq!(back, sample_data());
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_parts_round_trip() -> Result<()> {
        assert_codec_round_trip("gzip", ".gz", &[0x1f, 0x8b])
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_parts_round_trip() -> Result<()> {
        assert_codec_round_trip("zstd", ".zst", &[0x28, 0xb5, 0x2f, 0xfd])
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn bzip2_parts_round_trip() -> Result<()> {
        assert_codec_round_trip("bzip2", ".bz2", b"BZh")
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn xz_parts_round_trip() -> Result<()> {
        assert_codec_round_trip("xz", ".xz", &[0xfd, b'7', b'z', b'X', b'Z', 0x00])
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn renamed_part_is_still_detected_by_magic_bytes() -> Result<()> {
        let (fs, path) = write_compressed("gzip")?;
        let bare = PathBuf::from("out/renamed");
        fs.rename(&path, &bare)?;

        let mut text = String::new();
        auto_detect_reader(fs.open(&bare)?, &bare)?.read_to_string(&mut text)?;
        assert_eq!(text.lines().count(), 50);
        assert!(text.starts_with(r#"{"key":0,"#));
        Ok(())
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn plain_part_starting_with_magic_bytes_reads_back_verbatim() -> Result<()> {
        let (fs, sink) = memory_sink::<String, u64>("text", "out")?;
        let mut task = sink.open(0, 1)?;
        task.write_record(&"BZhello".to_string(), &1)?;
        task.close()?;
        sink.finalize_global(1)?;

        assert_eq!(stagecommit::format::read_text_part(&fs, "out/1")?, vec!["BZhello\t1"]);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn compressed_local_part_is_readable_with_flate2() -> Result<()> {
        let tmp = TempDirPath::new()?;
        let out = tmp.file_path("out");
        let conf = Configuration::for_output_dir(&out).with(OUTPUT_COMPRESSION, "gzip");
        let sink = local_sink_with::<String, u64>("text", conf)?;
        let mut task = sink.open(0, 1)?;
        task.write_record(&"hello".to_string(), &3)?;
        task.close()?;

        let mut text = String::new();
        flate2::read::GzDecoder::new(std::fs::File::open(out.join("1.gz"))?).read_to_string(&mut text)?;
        assert_eq!(text, "hello\t3\n");
        Ok(())
    }

    struct Passthrough(Box<dyn Write + Send>);

    impl Write for Passthrough {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    impl EncodedWrite for Passthrough {
        fn finish(mut self: Box<Self>) -> io::Result<()> {
            self.0.flush()
        }
    }

    struct PassthroughCodec;

    impl CompressionCodec for PassthroughCodec {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn extension(&self) -> &str {
            ".pt"
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
            Ok(reader)
        }

        fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>> {
            Ok(Box::new(Passthrough(writer)))
        }
    }

    #[test]
    fn registered_codec_names_the_committed_part() -> Result<()> {
        register_codec(Arc::new(PassthroughCodec));
        let (fs, path) = write_compressed("passthrough")?;
        assert_eq!(path, PathBuf::from("out/1.pt"));
        let back: Vec<(u32, Reading)> = read_jsonl_part(&fs, &path)?;
        assert_eq!(back, sample_data());
        Ok(())
    }
}
