//! On-disk memoization of degree CDFs.
//!
//! Building a robust soliton CDF is `O(K)` per parameter set, and sweeps
//! rebuild the same few sets in many processes. Each CDF is stored once under
//! a content-addressed name derived from its [`CdfKey`]:
//!
//! ```text
//! <cache dir>/uep-sim/degree-cdf/<sha256(K, c, delta)>.cdf
//! ```
//!
//! ## Payload
//!
//! ```text
//! magic   8 bytes  "UEPCDF01"
//! K       u64 LE
//! c       f64 LE
//! delta   f64 LE
//! len     u64 LE
//! cdf     len x f64 LE
//! ```
//!
//! ## Concurrency
//!
//! Entries are written to a temporary file and moved into place only if no
//! entry exists yet, so readers never see a partial payload. Two processes
//! racing on the same key may both compute the CDF; the loser's copy is
//! discarded.

use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::degree::{check_cdf, CdfKey, CdfOrigin, RobustSoliton};
use crate::error::{UepError, UepResult};

/// Cache directory name under the user's cache directory
const CACHE_DIR: &str = "uep-sim/degree-cdf";

const MAGIC: &[u8; 8] = b"UEPCDF01";
const HASH_DOMAIN_TAG: &[u8] = b"uep-degree-cdf/v1";

impl CdfKey {
    /// Stable SHA-256 digest of the key, as lowercase hex.
    ///
    /// Floats are hashed by bit pattern, so keys differing in any bit get
    /// different entries.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(HASH_DOMAIN_TAG);
        hasher.update((self.k as u64).to_le_bytes());
        hasher.update(self.c.to_bits().to_le_bytes());
        hasher.update(self.delta.to_bits().to_le_bytes());
        let digest = hasher.finalize();

        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

/// Content-addressed store of degree CDFs.
#[derive(Debug, Clone)]
pub struct CdfCache {
    dir: PathBuf,
}

impl CdfCache {
    /// Use `dir` as the cache directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-user cache directory, e.g. `~/.cache/uep-sim/degree-cdf`.
    pub fn default_location() -> Self {
        let dir = directories::BaseDirs::new()
            .map(|d| d.cache_dir().join(CACHE_DIR))
            .unwrap_or_else(|| PathBuf::from(".cache").join(CACHE_DIR));
        Self::new(dir)
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the CDF for `key`.
    pub fn path_for(&self, key: &CdfKey) -> PathBuf {
        self.dir.join(format!("{}.cdf", key.digest()))
    }

    /// Read the CDF for `key`, if present.
    ///
    /// An entry whose embedded parameters differ from `key` is an error,
    /// never a cache miss.
    pub fn load(&self, key: &CdfKey) -> UepResult<Option<Vec<f64>>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| UepError::CacheCorrupt {
            path: path.clone(),
            reason,
        };

        let (stored, cdf) = decode_payload(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if stored != *key {
            return Err(UepError::CacheMismatch {
                expected: key.to_string(),
                found: stored.to_string(),
            });
        }
        check_cdf(&cdf, key.k).map_err(corrupt)?;

        Ok(Some(cdf))
    }

    /// Store `cdf` under `key` unless an entry already exists.
    ///
    /// Returns `true` if this call created the entry.
    pub fn store(&self, key: &CdfKey, cdf: &[f64]) -> UepResult<bool> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&encode_payload(key, cdf)?)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                warn!(key = %key, path = %path.display(), "CDF cache entry already written by another process");
                Ok(false)
            }
            Err(e) => Err(e.error.into()),
        }
    }

    /// Load the CDF for `key`, or compute and store it.
    pub fn load_or_build(&self, key: &CdfKey) -> UepResult<(Arc<[f64]>, CdfOrigin)> {
        if let Some(cdf) = self.load(key)? {
            debug!(key = %key, "loaded degree CDF from cache");
            return Ok((cdf.into(), CdfOrigin::Loaded));
        }

        let cdf = RobustSoliton::new(key.k, key.c, key.delta)?.cdf();
        let created = self.store(key, &cdf)?;
        debug!(key = %key, created, dir = %self.dir.display(), "computed degree CDF");
        Ok((cdf.into(), CdfOrigin::Computed))
    }
}

impl Default for CdfCache {
    fn default() -> Self {
        Self::default_location()
    }
}

fn encode_payload(key: &CdfKey, cdf: &[f64]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(MAGIC.len() + 32 + cdf.len() * 8);
    buf.write_all(MAGIC)?;
    buf.write_u64::<LittleEndian>(key.k as u64)?;
    buf.write_f64::<LittleEndian>(key.c)?;
    buf.write_f64::<LittleEndian>(key.delta)?;
    buf.write_u64::<LittleEndian>(cdf.len() as u64)?;
    for &p in cdf {
        buf.write_f64::<LittleEndian>(p)?;
    }
    Ok(buf)
}

fn decode_payload(bytes: &[u8]) -> io::Result<(CdfKey, Vec<f64>)> {
    let mut rd = Cursor::new(bytes);

    let mut magic = [0u8; 8];
    rd.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }

    let k = rd.read_u64::<LittleEndian>()? as usize;
    let c = rd.read_f64::<LittleEndian>()?;
    let delta = rd.read_f64::<LittleEndian>()?;
    let len = rd.read_u64::<LittleEndian>()? as usize;

    let remaining = bytes.len() - rd.position() as usize;
    if len.checked_mul(8) != Some(remaining) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload holds {remaining} bytes, header announces {len} values"),
        ));
    }

    let mut cdf = Vec::with_capacity(len);
    for _ in 0..len {
        cdf.push(rd.read_f64::<LittleEndian>()?);
    }

    Ok((CdfKey::new(k, c, delta), cdf))
}
