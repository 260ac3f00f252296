use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::error::GseaError;

/// Opens a text file for buffered reading, decompressing `*.gz` on the fly.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, GseaError> {
    let file = fs::File::open(path)
        .map_err(|err| GseaError::Filesystem(format!("open {}: {err}", path.display())))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn read_gz_to_string(path: &Path) -> Result<String, GseaError> {
    let file = fs::File::open(path)
        .map_err(|err| GseaError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|err| GseaError::Filesystem(format!("decompress {}: {err}", path.display())))?;
    Ok(text)
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// File name with a trailing `.gz` removed, lowercased.
pub fn plain_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    Some(name.strip_suffix(".gz").map(str::to_string).unwrap_or(name))
}

/// All regular files under `root` whose name ends with `suffix`, sorted.
pub fn find_files_with_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    out.sort();
    out
}

/// Immediate subdirectories of `root`, sorted, hidden ones skipped.
pub fn list_subdirs(root: &Path) -> Result<Vec<PathBuf>, GseaError> {
    let entries = fs::read_dir(root)
        .map_err(|err| GseaError::Filesystem(format!("read {}: {err}", root.display())))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| GseaError::Filesystem(err.to_string()))?;
        let path = entry.path();
        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(true);
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_in_dirs(name, std::env::split_paths(&path_var))
}

/// First executable `name` (or `name.exe`) in `dirs`.
pub fn find_in_dirs(name: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.into_iter().find_map(|dir| {
        [dir.join(format!("{name}.exe")), dir.join(name)]
            .into_iter()
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Writes through a sibling temp file so readers never see partial output.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), GseaError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| io_err(parent, err))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".gsea-batch")
        .tempfile_in(parent)
        .map_err(|err| io_err(parent, err))?;
    temp.write_all(content).map_err(|err| io_err(path, err))?;
    temp.persist(path)
        .map_err(|err| GseaError::Filesystem(format!("{}: {}", path.display(), err.error)))?;
    Ok(())
}

/// Renders `header` and `rows` as CSV and writes them with [`write_atomic`].
pub fn write_csv_atomic<R, F>(
    path: &Path,
    header: &[&str],
    rows: impl IntoIterator<Item = R>,
) -> Result<(), GseaError>
where
    R: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let csv_err = |err: csv::Error| GseaError::Filesystem(format!("{}: {err}", path.display()));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| io_err(path, err.into_error()))?;
    write_atomic(path, &content)
}

pub fn io_err(path: &Path, err: io::Error) -> GseaError {
    GseaError::Filesystem(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn open_text_reads_gzip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("matrix.txt.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"NAME\tA\nTP53\t1\n").unwrap();
        encoder.finish().unwrap();

        let lines: Vec<String> = open_text(&path).unwrap().lines().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["NAME\tA", "TP53\t1"]);
        assert_eq!(plain_name(&path).unwrap(), "matrix.txt");
    }

    #[cfg(unix)]
    #[test]
    fn path_lookup_skips_non_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let stray = temp.path().join("stray");
        let real = temp.path().join("real");
        fs::create_dir_all(&stray).unwrap();
        fs::create_dir_all(&real).unwrap();
        fs::write(stray.join("gsea-cli.sh"), "#!/bin/sh\n").unwrap();
        let tool = real.join("gsea-cli.sh");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!is_executable(&stray.join("gsea-cli.sh")));
        assert_eq!(
            find_in_dirs("gsea-cli.sh", [stray.clone(), real.clone()]),
            Some(tool)
        );
        assert_eq!(find_in_dirs("gsea-cli.sh", [stray]), None);
    }
}
