use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

// Where the addresses come from: one on the command line, or a file of them
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Single(String),
    File(PathBuf),
}

impl InputSource {
    // An existing file path is read as a list; anything else is one address
    pub fn new(input: &str) -> io::Result<Self> {
        if let Ok(metadata) = std::fs::metadata(input) {
            if metadata.is_file() {
                return Ok(Self::File(PathBuf::from(input)));
            }
            if metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{input} is a directory, not a file"),
                ));
            }
        }

        Ok(Self::Single(input.trim().to_string()))
    }

    pub fn load_addresses(&self) -> io::Result<Vec<String>> {
        match self {
            Self::Single(value) => Ok(vec![value.clone()]),
            Self::File(path) => read_addresses_from_file(path),
        }
    }
}

// One address per line; blank lines and `#` comments are skipped
pub fn read_addresses_from_file(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut addresses = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            addresses.push(trimmed.to_string());
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_value_is_single() {
        let source = InputSource::new(" user@example.com ").unwrap();
        assert_eq!(source, InputSource::Single("user@example.com".to_string()));
        assert_eq!(source.load_addresses().unwrap(), ["user@example.com"]);
    }

    #[test]
    fn file_skips_blanks_and_comments() {
        let path = std::env::temp_dir().join(format!("inboxprobe-input-{}.txt", std::process::id()));
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "# team").unwrap();
            writeln!(file, "alice@example.com").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "  bob@example.com  ").unwrap();
        }

        let source = InputSource::new(path.to_str().unwrap()).unwrap();
        assert!(matches!(source, InputSource::File(_)));
        assert_eq!(
            source.load_addresses().unwrap(),
            ["alice@example.com", "bob@example.com"]
        );

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn directory_is_rejected() {
        let dir = std::env::temp_dir();
        let err = InputSource::new(dir.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
