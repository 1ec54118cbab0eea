//! Release download and unpacking for servers that ship prebuilt archives

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::servers::{ArchiveKind, BinaryDownload, ServerSpec};
use crate::error::LspError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Download, unpack and mark the server binary executable; returns its path.
pub async fn install(
    spec: &ServerSpec,
    download: &BinaryDownload,
    install_dir: &Path,
) -> Result<PathBuf, LspError> {
    let url = download.url_for_current(spec.name)?;
    let failed = |message: String| LspError::Download {
        server: spec.name.to_string(),
        message,
    };

    tracing::info!("Downloading {} {} from {}", spec.name, download.version, url);

    tokio::fs::create_dir_all(install_dir).await?;
    let archive_path = install_dir.join(archive_file_name(spec.name, download));

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| failed(e.to_string()))?;
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    tokio::fs::write(&archive_path, &bytes).await?;

    let extracted = extract(&archive_path, download.archive, install_dir).await;
    let _ = tokio::fs::remove_file(&archive_path).await;
    extracted.map_err(|e| failed(e.to_string()))?;

    let binary = install_dir.join(spec.binary_name());
    if !binary.is_file() {
        return Err(failed(format!(
            "archive did not contain {}",
            spec.binary_name()
        )));
    }
    make_executable(&binary)?;

    tracing::info!("Installed {} to {}", spec.name, binary.display());
    Ok(binary)
}

pub fn archive_file_name(server: &str, download: &BinaryDownload) -> String {
    let extension = match download.archive {
        ArchiveKind::Zip => "zip",
        ArchiveKind::TarGz => "tar.gz",
    };
    format!("{}_{}.{}", server, download.version, extension)
}

/// Unpack `archive` into `dest` on the blocking pool
async fn extract(archive: &Path, kind: ArchiveKind, dest: &Path) -> std::io::Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, kind, &dest))
        .await
        .map_err(std::io::Error::other)?
}

pub fn extract_blocking(archive: &Path, kind: ArchiveKind, dest: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive)?;
    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))
                .map_err(std::io::Error::other)?;
            zip.extract(dest).map_err(std::io::Error::other)
        }
        ArchiveKind::TarGz => {
            tar::Archive::new(flate2::read::GzDecoder::new(file)).unpack(dest)
        }
    }
}

/// `0755` on Unix; no-op elsewhere
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::servers::is_executable;
    use crate::models::symbol::Language;

    #[test]
    fn test_archive_file_name() {
        let spec = ServerSpec::for_language(Language::Terraform).unwrap();
        let download = spec.download.unwrap();
        assert_eq!(
            archive_file_name(spec.name, &download),
            "terraform-ls_0.33.3.zip"
        );
    }

    #[test]
    fn test_extract_zip() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("terraform-ls_0.33.3.zip");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("terraform-ls", options).unwrap();
        writer.write_all(b"binary").unwrap();
        writer.start_file("LICENSE.txt", options).unwrap();
        writer.write_all(b"MPL-2.0").unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        extract_blocking(&archive, ArchiveKind::Zip, &dest).unwrap();
        assert_eq!(std::fs::read(dest.join("terraform-ls")).unwrap(), b"binary");
        assert!(dest.join("LICENSE.txt").is_file());
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("server.tar.gz");
        let encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        let body = b"binary";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "bin/server", &body[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        extract_blocking(&archive, ArchiveKind::TarGz, &dest).unwrap();
        assert_eq!(std::fs::read(dest.join("bin/server")).unwrap(), b"binary");
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        assert!(extract(&archive, ArchiveKind::Zip, dir.path()).await.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("terraform-ls");
        std::fs::write(&binary, b"#!/bin/sh\n").unwrap();
        assert!(!is_executable(&binary));

        make_executable(&binary).unwrap();
        let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(is_executable(&binary));
    }
}
