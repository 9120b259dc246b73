use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Final byte of a compiled sequence container
pub const SENTINEL: u8 = 1;

/// Suffix appended to the FASTA file stem when compiling
pub const BINARY_SUFFIX: &str = "-binary-fasta";

/// One protein as read from a text FASTA file
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Record {
    pub id: String,
    pub annotation: String,
    pub sequence: String,
    /// Byte offset of the header line in the source file
    pub offset: u64,
}

/// Split a header line (without the leading `>`) into identifier and
/// annotation
pub fn parse_header(header: &str) -> (&str, &str) {
    let header = header.trim();
    match header.find(char::is_whitespace) {
        Some(idx) => (&header[..idx], header[idx..].trim()),
        None => (header, ""),
    }
}

/// Streaming reader over the records of a text FASTA file
pub struct FastaReader<R> {
    reader: R,
    path: PathBuf,
    /// Bytes consumed so far
    position: u64,
    line: Vec<u8>,
    /// Header of the next record, if it has already been read
    pending: Option<(String, u64)>,
    line_number: usize,
}

impl FastaReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::input(path, e.to_string()))?;
        Ok(Self::new(BufReader::new(file), path, 0))
    }
}

impl<R: BufRead> FastaReader<R> {
    /// `position` is the offset of the first byte `reader` will produce
    pub fn new<P: Into<PathBuf>>(reader: R, path: P, position: u64) -> Self {
        Self {
            reader,
            path: path.into(),
            position,
            line: Vec::new(),
            pending: None,
            line_number: 0,
        }
    }

    /// Read one line into `self.line`, returning the offset it started at
    fn read_line(&mut self) -> Result<Option<u64>> {
        self.line.clear();
        let start = self.position;
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| Error::input(&self.path, e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        self.position += n as u64;
        self.line_number += 1;
        Ok(Some(start))
    }

    fn push_residues(&self, sequence: &mut String) {
        for &byte in &self.line {
            if byte.is_ascii_alphabetic() {
                sequence.push(byte.to_ascii_uppercase() as char);
            } else if !byte.is_ascii_whitespace() {
                log::warn!(
                    "{}:{}: skipping non-alphabetic character `{}` in sequence",
                    self.path.display(),
                    self.line_number,
                    byte.escape_ascii()
                );
            }
        }
    }

    /// Read the next record with a non-empty sequence
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let (header, offset) = match self.pending.take() {
                Some(pending) => pending,
                None => loop {
                    match self.read_line()? {
                        None => return Ok(None),
                        Some(offset) if self.line.first() == Some(&b'>') => {
                            break (String::from_utf8_lossy(&self.line[1..]).into_owned(), offset)
                        }
                        Some(_) if self.line.iter().all(u8::is_ascii_whitespace) => continue,
                        Some(_) => {
                            return Err(Error::input(
                                &self.path,
                                format!(
                                    "line {}: expected a `>` header before sequence data",
                                    self.line_number
                                ),
                            ))
                        }
                    }
                },
            };

            let mut sequence = String::new();
            while let Some(start) = self.read_line()? {
                if self.line.first() == Some(&b'>') {
                    let next = String::from_utf8_lossy(&self.line[1..]).into_owned();
                    self.pending = Some((next, start));
                    break;
                }
                self.push_residues(&mut sequence);
            }

            let (id, annotation) = parse_header(&header);
            if id.is_empty() {
                return Err(Error::input(
                    &self.path,
                    format!("malformed header at byte {}: missing identifier", offset),
                ));
            }
            if sequence.is_empty() {
                log::warn!(
                    "{}: protein `{}` has an empty sequence, skipping",
                    self.path.display(),
                    id
                );
                continue;
            }

            return Ok(Some(Record {
                id: id.into(),
                annotation: annotation.into(),
                sequence,
                offset,
            }));
        }
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Where the compiled container for `fasta` lives inside `directory`
pub fn binary_path<P: AsRef<Path>, Q: AsRef<Path>>(fasta: P, directory: Q) -> PathBuf {
    let stem = fasta
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "proteins".into());
    directory.as_ref().join(format!("{}{}", stem, BINARY_SUFFIX))
}

fn write_field<W: Write>(w: &mut W, field: &str) -> std::io::Result<()> {
    // Length includes the trailing NUL
    let len = field.len() as i32 + 1;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(field.as_bytes())?;
    w.write_all(&[0])
}

pub fn write_binary_record<W: Write>(w: &mut W, record: &Record) -> std::io::Result<()> {
    write_field(w, &record.id)?;
    write_field(w, &record.annotation)?;
    write_field(w, &record.sequence)
}

/// Compile a text FASTA file into the binary container format, returning
/// the path of the container and the number of proteins written
pub fn compile<P: AsRef<Path>, Q: AsRef<Path>>(fasta: P, directory: Q) -> Result<(PathBuf, usize)> {
    let output = binary_path(&fasta, directory);
    log::debug!(
        "compiling `{}` into `{}`",
        fasta.as_ref().display(),
        output.display()
    );

    let mut wtr = BufWriter::new(File::create(&output)?);
    let mut count = 0;
    for record in FastaReader::open(&fasta)? {
        write_binary_record(&mut wtr, &record?)?;
        count += 1;
    }
    wtr.write_all(&[SENTINEL])?;
    wtr.flush()?;
    Ok((output, count))
}

/// Byte spans of one record inside a compiled container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryRecord {
    pub id: Range<usize>,
    pub annotation: Range<usize>,
    pub sequence: Range<usize>,
    /// Offset of the record within the container
    pub offset: usize,
}

fn read_field(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<Range<usize>> {
    let header = bytes
        .get(*cursor..*cursor + 4)
        .ok_or_else(|| Error::input(path, format!("truncated record at byte {}", cursor)))?;
    let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len < 1 {
        return Err(Error::input(
            path,
            format!("invalid field length {} at byte {}", len, cursor),
        ));
    }
    let start = *cursor + 4;
    // Stored length counts the trailing NUL
    let end = start + len as usize;
    match bytes.get(end - 1) {
        Some(0) => {}
        _ => {
            return Err(Error::input(
                path,
                format!("unterminated field at byte {}", start),
            ))
        }
    }
    if std::str::from_utf8(&bytes[start..end - 1]).is_err() {
        return Err(Error::input(path, format!("invalid text at byte {}", start)));
    }
    *cursor = end;
    Ok(start..end - 1)
}

/// Parse the record starting at `offset`
pub fn read_binary_record(bytes: &[u8], offset: usize, path: &Path) -> Result<BinaryRecord> {
    let mut cursor = offset;
    let id = read_field(bytes, &mut cursor, path)?;
    let annotation = read_field(bytes, &mut cursor, path)?;
    let sequence = read_field(bytes, &mut cursor, path)?;
    Ok(BinaryRecord {
        id,
        annotation,
        sequence,
        offset,
    })
}

/// Locate every record of a compiled container
pub fn parse_binary(bytes: &[u8], path: &Path) -> Result<Vec<BinaryRecord>> {
    let mut records = Vec::new();
    let mut cursor = 0;
    loop {
        match bytes.len() - cursor {
            0 => return Err(Error::input(path, "missing end-of-container sentinel")),
            1 if bytes[cursor] == SENTINEL => return Ok(records),
            _ => {
                let record = read_binary_record(bytes, cursor, path)?;
                cursor = record.sequence.end + 1;
                records.push(record);
            }
        }
    }
}

/// Read a whole text FASTA file into memory
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    FastaReader::open(path)?.collect()
}

/// Parse FASTA text that is already in memory
pub fn parse_str(contents: &str) -> Result<Vec<Record>> {
    FastaReader::new(contents.as_bytes(), "<memory>", 0).collect()
}

/// Read a single record beginning exactly at `offset`
pub fn read_record_at<P: AsRef<Path>>(path: P, offset: u64) -> Result<Record> {
    use std::io::{Seek, SeekFrom};

    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::input(path, e.to_string()))?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut peek = [0u8; 1];
    reader.read_exact(&mut peek)?;
    if peek[0] != b'>' {
        return Err(Error::input(
            path,
            format!("no protein header at byte {}", offset),
        ));
    }
    let chained = std::io::Cursor::new(peek).chain(reader);
    FastaReader::new(BufReader::new(chained), path, offset)
        .next_record()?
        .ok_or_else(|| Error::input(path, format!("no protein at byte {}", offset)))
}
