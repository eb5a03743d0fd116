use crate::error::{BergamotError, Result};
use crate::models::layout::ENGINE_CONFIG_FILE;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Training config shipped in translateLocally-style archives
pub const TRAINING_CONFIG_FILE: &str = "config.intgemm8bitalpha.yml";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpack a (possibly gzip-compressed) tar archive into `dest`
pub async fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| BergamotError::Archive(format!("Extraction task failed: {e}")))?
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<()> {
    let mut file = File::open(archive)?;

    let mut magic = [0u8; 2];
    let compressed = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    let reader = BufReader::new(file);
    let result = if compressed {
        tar::Archive::new(GzDecoder::new(reader)).unpack(dest)
    } else {
        tar::Archive::new(reader).unpack(dest)
    };

    result.map_err(|e| {
        BergamotError::Archive(format!("Failed to extract {}: {e}", archive.display()))
    })?;

    tracing::debug!("Extracted {} into {}", archive.display(), dest.display());
    Ok(())
}

/// Find the training config inside an extracted model directory
///
/// Prefers the int8 alpha-quantized config, then any other `config.*.yml`
/// (sorted by name) that is not an engine config.
pub fn find_training_config(model_dir: &Path) -> Result<PathBuf> {
    let preferred = model_dir.join(TRAINING_CONFIG_FILE);
    if preferred.is_file() {
        return Ok(preferred);
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(model_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                    name.starts_with("config.")
                        && name.ends_with(".yml")
                        && name != ENGINE_CONFIG_FILE
                })
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        BergamotError::Archive(format!(
            "No training config (config.*.yml) in {}",
            model_dir.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        std::io::Write::write_all(&mut encoder, bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_extract_gzip_and_plain() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = tar_bytes(&[("en-de-tiny11/vocab.deen.spm", b"vocab".as_slice())]);

        let gz = temp_dir.path().join("a.tar.gz");
        fs::write(&gz, gzip(&tarball)).unwrap();
        let plain = temp_dir.path().join("b.tar");
        fs::write(&plain, &tarball).unwrap();

        let out_gz = temp_dir.path().join("gz");
        let out_plain = temp_dir.path().join("plain");
        extract(&gz, &out_gz).await.unwrap();
        extract(&plain, &out_plain).await.unwrap();

        assert_eq!(fs::read(out_gz.join("en-de-tiny11/vocab.deen.spm")).unwrap(), b"vocab");
        assert_eq!(fs::read(out_plain.join("en-de-tiny11/vocab.deen.spm")).unwrap(), b"vocab");
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_archive_error() {
        let temp_dir = TempDir::new().unwrap();
        // Valid gzip header followed by a deflate block of reserved type
        let mut corrupt = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];
        corrupt.extend_from_slice(&[0xff; 64]);
        let archive = temp_dir.path().join("broken.tar.gz");
        fs::write(&archive, &corrupt).unwrap();

        let err = extract(&archive, temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, BergamotError::Archive(_)));
        assert!(archive.exists());
    }

    #[test]
    fn test_find_training_config_preference() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        fs::write(dir.join(ENGINE_CONFIG_FILE), "a: 1").unwrap();
        assert!(matches!(find_training_config(dir), Err(BergamotError::Archive(_))));

        fs::write(dir.join("config.yml.bak"), "a: 1").unwrap();
        fs::write(dir.join("config.fp32.yml"), "a: 1").unwrap();
        assert_eq!(find_training_config(dir).unwrap(), dir.join("config.fp32.yml"));

        fs::write(dir.join(TRAINING_CONFIG_FILE), "a: 1").unwrap();
        assert_eq!(find_training_config(dir).unwrap(), dir.join(TRAINING_CONFIG_FILE));
    }
}
