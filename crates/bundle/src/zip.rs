//! ZIP32 store-only 打包
//!
//! Layout: for each entry a local file header followed by the raw payload,
//! then the central directory, then the end-of-central-directory record.
//! No compression, no extra fields, zero MS-DOS time/date, little-endian.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::atomic::write_atomic_with;
use crate::error::{BundleError, Result};
use crate::registry::relative_name;

const LOCAL_HEADER_SIG: u32 = 0x0403_4B50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4B50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4B50;
const ZIP_VERSION: u16 = 20;
const METHOD_STORE: u16 = 0;
const MAX_ENTRIES: usize = u16::MAX as usize;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// IEEE CRC-32, streaming
#[derive(Debug, Clone, Copy)]
pub struct Crc32(u32);

impl Default for Crc32 {
    fn default() -> Self {
        Self(0xFFFF_FFFF)
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = CRC_TABLE[((self.0 ^ u32::from(b)) & 0xFF) as usize] ^ (self.0 >> 8);
        }
    }

    pub fn finalize(self) -> u32 {
        self.0 ^ 0xFFFF_FFFF
    }
}

pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(bytes);
    crc.finalize()
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    source: PathBuf,
    size: u32,
    crc: u32,
    offset: u32,
}

/// Result of a successful archive write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// `<bundle_dir>.zip`, sibling of the bundle directory
pub fn zip_path_for(bundle_dir: &Path) -> PathBuf {
    let mut name = bundle_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".zip");
    bundle_dir.with_file_name(name)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            out.push((relative_name(root, &path)?, path));
        }
    }
    Ok(())
}

/// Regular files under `bundle_dir`, sorted by relative path
fn enumerate(bundle_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    collect_files(bundle_dir, bundle_dir, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn checksum(path: &Path) -> Result<(u32, u32)> {
    let mut file = File::open(path)?;
    let mut crc = Crc32::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        crc.update(&buf[..n]);
        size += n as u64;
    }
    let size = u32::try_from(size).map_err(|_| {
        BundleError::zip_limit(format!("'{}' is larger than 4 GiB", path.display()))
    })?;
    Ok((size, crc.finalize()))
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| BundleError::zip_limit(format!("{what} exceeds 4 GiB")))
}

fn put_u16(w: &mut impl Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn put_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_local_header(w: &mut impl Write, entry: &Entry) -> io::Result<()> {
    put_u32(w, LOCAL_HEADER_SIG)?;
    put_u16(w, ZIP_VERSION)?;
    put_u16(w, 0)?; // flags
    put_u16(w, METHOD_STORE)?;
    put_u16(w, 0)?; // time
    put_u16(w, 0)?; // date
    put_u32(w, entry.crc)?;
    put_u32(w, entry.size)?;
    put_u32(w, entry.size)?;
    put_u16(w, entry.name.len() as u16)?;
    put_u16(w, 0)?; // extra
    w.write_all(entry.name.as_bytes())
}

fn write_central_header(w: &mut impl Write, entry: &Entry) -> io::Result<()> {
    put_u32(w, CENTRAL_HEADER_SIG)?;
    put_u16(w, ZIP_VERSION)?; // made by
    put_u16(w, ZIP_VERSION)?; // needed
    put_u16(w, 0)?;
    put_u16(w, METHOD_STORE)?;
    put_u16(w, 0)?;
    put_u16(w, 0)?;
    put_u32(w, entry.crc)?;
    put_u32(w, entry.size)?;
    put_u32(w, entry.size)?;
    put_u16(w, entry.name.len() as u16)?;
    put_u16(w, 0)?; // extra
    put_u16(w, 0)?; // comment
    put_u16(w, 0)?; // disk start
    put_u16(w, 0)?; // internal attrs
    put_u32(w, 0)?; // external attrs
    put_u32(w, entry.offset)?;
    w.write_all(entry.name.as_bytes())
}

fn write_end_of_central(w: &mut impl Write, count: u16, cd_size: u32, cd_offset: u32) -> io::Result<()> {
    put_u32(w, END_OF_CENTRAL_SIG)?;
    put_u16(w, 0)?;
    put_u16(w, 0)?;
    put_u16(w, count)?;
    put_u16(w, count)?;
    put_u32(w, cd_size)?;
    put_u32(w, cd_offset)?;
    put_u16(w, 0)
}

fn copy_payload(w: &mut impl Write, entry: &Entry) -> Result<()> {
    let file = File::open(&entry.source)?;
    let copied = io::copy(&mut file.take(u64::from(entry.size) + 1), w)?;
    if copied != u64::from(entry.size) {
        return Err(BundleError::write(
            &entry.source,
            "file changed size while archiving",
        ));
    }
    Ok(())
}

/// 打包 bundle 目录为同级 ZIP
///
/// The archive is written to a temp sibling and renamed into place, so an
/// error never leaves a partial `<bundle_dir>.zip`.
#[instrument(name = "bundle_zip", skip(bundle_dir), fields(bundle = %bundle_dir.display()))]
pub fn write_bundle_zip(bundle_dir: &Path) -> Result<ZipSummary> {
    let base_name = bundle_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BundleError::write(bundle_dir, "bundle directory has no name"))?;

    let files = enumerate(bundle_dir)?;
    if files.is_empty() {
        return Err(BundleError::EmptyBundle {
            dir: bundle_dir.to_path_buf(),
        });
    }
    if files.len() > MAX_ENTRIES {
        return Err(BundleError::zip_limit(format!(
            "{} entries (max {MAX_ENTRIES})",
            files.len()
        )));
    }

    let mut entries = Vec::with_capacity(files.len());
    let mut offset = 0u64;
    for (rel, source) in files {
        let name = format!("{base_name}/{rel}");
        if name.len() > usize::from(u16::MAX) {
            return Err(BundleError::zip_limit(format!("entry name too long: {name}")));
        }
        let (size, crc) = checksum(&source)?;
        let header_len = 30 + name.len() as u64;
        entries.push(Entry {
            offset: to_u32(offset, "local header offset")?,
            name,
            source,
            size,
            crc,
        });
        offset += header_len + u64::from(size);
    }

    let cd_offset = to_u32(offset, "central directory offset")?;
    let cd_len: u64 = entries.iter().map(|e| 46 + e.name.len() as u64).sum();
    let cd_size = to_u32(cd_len, "central directory size")?;
    let total = offset + cd_len + 22;

    let zip_path = zip_path_for(bundle_dir);
    write_atomic_with(&zip_path, |w| {
        for entry in &entries {
            write_local_header(w, entry)?;
            copy_payload(w, entry)?;
        }
        for entry in &entries {
            write_central_header(w, entry)?;
        }
        write_end_of_central(w, entries.len() as u16, cd_size, cd_offset)?;
        Ok(())
    })?;

    info!(zip = %zip_path.display(), entries = entries.len(), bytes = total, "bundle archived");
    Ok(ZipSummary {
        path: zip_path,
        entries: entries.len(),
        bytes: total,
    })
}
