//! Binary layout of one peptide inside a bucket file. All integers are
//! little-endian.
//!
//! ```text
//! u8   length
//! f64  mass
//! u8   1 if a modification overlay follows, else 0
//! i32  source count
//!      per source: i32 protein ordinal, u8 specificity tag, i32 1-based start
//! i32  overlay length, followed by that many u16 modified residues
//! ```

use crate::enzyme::Specificity;
use crate::modification::ModifiedResidue;
use crate::peptide::{Peptide, PeptideSource};
use std::io::{self, Read, Write};

/// Size of the fixed header read during fast-forward scans
pub const HEADER_LEN: usize = 10;

const SOURCE_LEN: u64 = 9;

/// Upper bound on the number of sources a single record may claim
const MAX_SOURCES: i32 = 1 << 26;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Header {
    pub length: u8,
    pub mass: f64,
    pub modified: bool,
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_peptide<W: Write>(w: &mut W, peptide: &Peptide) -> io::Result<()> {
    w.write_all(&[peptide.length() as u8])?;
    w.write_all(&peptide.mass().to_le_bytes())?;
    w.write_all(&[peptide.is_modified() as u8])?;

    w.write_all(&(peptide.sources().len() as i32).to_le_bytes())?;
    for source in peptide.sources() {
        w.write_all(&(source.protein as i32).to_le_bytes())?;
        w.write_all(&[source.specificity.tag()])?;
        w.write_all(&(source.start as i32).to_le_bytes())?;
    }

    let overlay = peptide.overlay().unwrap_or_default();
    w.write_all(&(overlay.len() as i32).to_le_bytes())?;
    for residue in overlay {
        w.write_all(&residue.0.to_le_bytes())?;
    }
    Ok(())
}

/// Read the fixed header of the next record. Returns `None` at a clean end
/// of input
pub fn read_header<R: Read>(r: &mut R) -> io::Result<Option<Header>> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated peptide header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let mut mass = [0u8; 8];
    mass.copy_from_slice(&buf[1..9]);
    let modified = match buf[9] {
        0 => false,
        1 => true,
        flag => return Err(invalid(format!("invalid overlay flag {}", flag))),
    };
    Ok(Some(Header {
        length: buf[0],
        mass: f64::from_le_bytes(mass),
        modified,
    }))
}

fn read_source_count<R: Read>(r: &mut R) -> io::Result<usize> {
    let count = read_i32(r)?;
    if !(1..=MAX_SOURCES).contains(&count) {
        return Err(invalid(format!("invalid source count {}", count)));
    }
    Ok(count as usize)
}

fn read_overlay_len<R: Read>(r: &mut R, header: &Header) -> io::Result<usize> {
    let len = read_i32(r)?;
    let expected = match header.modified {
        true => header.length as i32,
        false => 0,
    };
    if len != expected {
        return Err(invalid(format!(
            "overlay length {} does not match peptide length {}",
            len, header.length
        )));
    }
    Ok(len as usize)
}

/// Read the remainder of a record whose header has already been consumed
pub fn read_body<R: Read>(r: &mut R, header: Header) -> io::Result<Peptide> {
    let count = read_source_count(r)?;
    let mut sources = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let protein = read_i32(r)?;
        let tag = read_u8(r)?;
        let start = read_i32(r)?;
        let specificity = Specificity::from_tag(tag)
            .ok_or_else(|| invalid(format!("invalid specificity tag {}", tag)))?;
        if protein < 0 || start < 1 {
            return Err(invalid(format!(
                "invalid source (protein {}, start {})",
                protein, start
            )));
        }
        sources.push(PeptideSource::new(protein as u32, start as u32, specificity));
    }

    let len = read_overlay_len(r, &header)?;
    let overlay = match len {
        0 => None,
        _ => {
            let mut overlay = Vec::with_capacity(len);
            for _ in 0..len {
                let mut buf = [0u8; 2];
                r.read_exact(&mut buf)?;
                overlay.push(ModifiedResidue(u16::from_le_bytes(buf)));
            }
            Some(overlay)
        }
    };

    Peptide::from_parts(header.length, header.mass, sources, overlay)
        .ok_or_else(|| invalid("peptide without sources".into()))
}

/// Skip the remainder of a record whose header has already been consumed
pub fn skip_body<R: Read>(r: &mut R, header: Header) -> io::Result<()> {
    let count = read_source_count(r)? as u64;
    skip(r, count * SOURCE_LEN)?;
    let len = read_overlay_len(r, &header)? as u64;
    skip(r, len * 2)
}

fn skip<R: Read>(r: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut r.take(n), &mut io::sink())?;
    if copied != n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated peptide record",
        ));
    }
    Ok(())
}

pub fn read_peptide<R: Read>(r: &mut R) -> io::Result<Option<Peptide>> {
    match read_header(r)? {
        Some(header) => read_body(r, header).map(Some),
        None => Ok(None),
    }
}
