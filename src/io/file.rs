//! Input/Output file handling with [`InputFile`] and [`OutputFile`].
//!
//! These types abstract over reading/writing both plaintext and gzip-compressed
//! input/output. The gzip helpers [`gzip_file()`] and [`gunzip_file()`] are used by
//! the chunked annotation pipeline, which ships compressed VCFs to the scoring
//! service and receives compressed score tables back.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::io::{self, BufWriter};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::VarMergeError;

/// Return an error if `path` does not exist.
pub fn require_exists(path: impl AsRef<Path>) -> Result<(), VarMergeError> {
    let path = path.as_ref();
    if path.exists() {
        Ok(())
    } else {
        Err(VarMergeError::NotFound(path.to_path_buf()))
    }
}

/// Check if a file is a gzipped by looking for the magic numbers
pub fn is_gzipped_file(file_path: impl AsRef<Path>) -> io::Result<bool> {
    let mut file = File::open(file_path.as_ref())?;
    let mut buffer = [0; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        // files shorter than two bytes cannot be gzip
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn has_gz_extension(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Compress `path` into `path.gz`, returning the new path. The original file is
/// left in place.
pub fn gzip_file(path: impl AsRef<Path>) -> Result<PathBuf, VarMergeError> {
    let path = path.as_ref();
    let mut gz_path = path.as_os_str().to_owned();
    gz_path.push(".gz");
    let gz_path = PathBuf::from(gz_path);

    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(gz_path)
}

/// Decompress `path` (which must end in `.gz`) next to itself, returning the
/// path with the `.gz` extension removed.
pub fn gunzip_file(path: impl AsRef<Path>) -> Result<PathBuf, VarMergeError> {
    let path = path.as_ref();
    if !has_gz_extension(path) {
        return Err(VarMergeError::ParseError(format!(
            "expected a .gz file, got {}",
            path.display()
        )));
    }
    let out_path = path.with_extension("");
    let mut decoder = GzDecoder::new(File::open(path)?);
    let mut output = BufWriter::new(File::create(&out_path)?);
    io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    Ok(out_path)
}

/// Represents an input file.
///
/// Reading goes through a common interface whether the file is plaintext or
/// gzip-compressed.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub filepath: PathBuf,
}

impl InputFile {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    /// Opens the file and returns a buffered reader.
    ///
    /// If the file is gzip-compressed (detected by its magic number), this method will
    /// automatically handle the decompression. A missing file is reported as
    /// [`VarMergeError::NotFound`].
    pub fn reader(&self) -> Result<BufReader<Box<dyn Read>>, VarMergeError> {
        require_exists(&self.filepath)?;
        let file = File::open(&self.filepath)?;
        let is_gzipped = is_gzipped_file(&self.filepath)?;
        let reader: Box<dyn Read> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }

    /// Read the first line of the file, without the trailing newline.
    pub fn first_line(&self) -> Result<Option<String>, VarMergeError> {
        let mut reader = self.reader()?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }
}

/// Represents an output file, gzip-compressed when its name ends in `.gz`.
pub struct OutputFile {
    filepath: PathBuf,
}

impl OutputFile {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    /// Create the file (and any missing parent directories) and return a
    /// buffered writer.
    pub fn writer(&self) -> Result<Box<dyn Write>, VarMergeError> {
        if let Some(parent) = self.filepath.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.filepath)?;
        let writer: Box<dyn Write> = if has_gz_extension(&self.filepath) {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };
        Ok(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_gzip_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_0.vcf");
        std::fs::write(&path, "6\t100\t.\tA\tG\t.\t.\t.\n").unwrap();

        let gz = gzip_file(&path).unwrap();
        assert_eq!(gz.file_name().unwrap(), "chunk_0.vcf.gz");
        assert!(is_gzipped_file(&gz).unwrap());

        std::fs::remove_file(&path).unwrap();
        let plain = gunzip_file(&gz).unwrap();
        assert_eq!(plain, path);
        let mut contents = String::new();
        File::open(&plain)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "6\t100\t.\tA\tG\t.\t.\t.\n");
    }

    #[test]
    fn test_missing_input_is_not_found() {
        let input = InputFile::new("tests_data/does_not_exist.txt");
        assert!(matches!(input.reader(), Err(VarMergeError::NotFound(_))));
    }

    #[test]
    fn test_gz_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lovd.vcf.gz");
        let mut writer = OutputFile::new(&path).writer().unwrap();
        writeln!(writer, "##fileformat=VCFv4.2").unwrap();
        drop(writer);
        assert!(is_gzipped_file(&path).unwrap());
        let line = InputFile::new(&path).first_line().unwrap();
        assert_eq!(line.as_deref(), Some("##fileformat=VCFv4.2"));
    }

    #[test]
    fn test_gunzip_requires_gz() {
        assert!(gunzip_file("tests_data/gnomad.csv").is_err());
    }
}
