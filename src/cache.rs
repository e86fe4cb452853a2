//! On-disk cache of compiled circuits, one file per [`CircuitSpec`].
//!
//! Layout (integers little-endian):
//!
//! ```text
//! magic "ZKLRCACH" | version u32 | spec fingerprint [32] | body sha256 [32]
//! body: (len u64, bincode R1CS) (len u64, bincode ProvingKey) (len u64, bincode VerifyingKey)
//! ```
//!
//! A file whose magic, version, fingerprint or checksum does not match is a
//! miss. Keys are used as stored; loading never repeats setup.

use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::{
    circuit::Circuit,
    circuits::{CircuitSpec, CIRCUIT_FORMAT_VERSION},
    compiler::compile,
    error::{CacheError, PipelineError},
    protocol::{setup, CompiledCircuit, ProvingKey, VerifyingKey},
    r1cs::R1CS,
};

const MAGIC: &[u8; 8] = b"ZKLRCACH";
const HEADER_LEN: usize = 8 + 4 + 32 + 32;

#[derive(Debug, Clone)]
pub struct CircuitCache {
    dir: PathBuf,
}

impl CircuitCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, spec: CircuitSpec) -> PathBuf {
        self.dir.join(format!("{}.cache", spec.id()))
    }

    /// `Ok(None)` when nothing is cached for `spec`.
    pub fn load(
        &self,
        spec: CircuitSpec,
        fingerprint: &[u8; 32],
    ) -> Result<Option<CompiledCircuit>, CacheError> {
        let path = self.path(spec);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let body = check_header(&bytes, fingerprint)?;

        let mut reader = SectionReader { rest: body };
        let r1cs: R1CS = reader.next()?;
        let pk: ProvingKey = reader.next()?;
        let vk: VerifyingKey = reader.next()?;
        Ok(Some(CompiledCircuit::from_keys(spec, r1cs, pk, vk)?))
    }

    /// Atomically replaces the cache file for `compiled.spec`.
    pub fn store(&self, compiled: &CompiledCircuit, fingerprint: &[u8; 32]) -> Result<(), CacheError> {
        let mut body = vec![];
        write_section(&mut body, &compiled.r1cs)?;
        write_section(&mut body, &compiled.pk)?;
        write_section(&mut body, &compiled.vk)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&CIRCUIT_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(fingerprint);
        bytes.extend_from_slice(&Sha256::digest(&body));
        bytes.extend_from_slice(&body);

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let target = self.path(compiled.spec);
        let tmp = target.with_extension(format!("cache.tmp.{}", std::process::id()));
        let stored = write_synced(&tmp, &bytes)
            .and_then(|()| fs::rename(&tmp, &target).map_err(io_err(&target)));
        if stored.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        stored
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut file = File::create(path).map_err(io_err(path))?;
    file.write_all(bytes).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}

fn check_header<'a>(bytes: &'a [u8], fingerprint: &[u8; 32]) -> Result<&'a [u8], CacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Truncated);
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[0..8] != MAGIC {
        return Err(CacheError::BadMagic);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&header[8..12]);
    let version = u32::from_le_bytes(version);
    if version != CIRCUIT_FORMAT_VERSION {
        return Err(CacheError::Version {
            found: version,
            expected: CIRCUIT_FORMAT_VERSION,
        });
    }
    if &header[12..44] != fingerprint {
        return Err(CacheError::Fingerprint);
    }
    if header[44..76] != Sha256::digest(body)[..] {
        return Err(CacheError::Checksum);
    }
    Ok(body)
}

fn write_section<T: Serialize>(out: &mut Vec<u8>, value: &T) -> Result<(), CacheError> {
    let encoded = bincode::serialize(value)?;
    out.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
    out.extend_from_slice(&encoded);
    Ok(())
}

struct SectionReader<'a> {
    rest: &'a [u8],
}

impl SectionReader<'_> {
    fn next<T: DeserializeOwned>(&mut self) -> Result<T, CacheError> {
        if self.rest.len() < 8 {
            return Err(CacheError::Truncated);
        }
        let (len, rest) = self.rest.split_at(8);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(len);
        let len = usize::try_from(u64::from_le_bytes(buf)).map_err(|_| CacheError::Truncated)?;
        if rest.len() < len {
            return Err(CacheError::Truncated);
        }
        let (section, rest) = rest.split_at(len);
        self.rest = rest;
        Ok(bincode::deserialize(section)?)
    }
}

/// Loads `circuit` from `cache`, or compiles and sets it up and then
/// persists the result. Returns the circuit and whether it came from cache.
#[instrument(skip_all, fields(spec = %circuit.spec()))]
pub fn setup_or_load<C: Circuit>(
    cache: Option<&CircuitCache>,
    circuit: &C,
    fingerprint: [u8; 32],
) -> Result<(Arc<CompiledCircuit>, bool), PipelineError> {
    let spec = circuit.spec();
    if let Some(cache) = cache {
        match cache.load(spec, &fingerprint) {
            Ok(Some(compiled)) => {
                info!(%spec, num_cons = compiled.num_constraints(), "loaded circuit from cache");
                return Ok((Arc::new(compiled), true));
            }
            Ok(None) => info!(%spec, "no cached circuit"),
            Err(err) => warn!(%spec, error = %err, "discarding cached circuit"),
        }
    }

    let r1cs = compile(circuit).map_err(|source| PipelineError::Compile { spec, source })?;
    let compiled = setup(spec, r1cs).map_err(|source| PipelineError::Setup { spec, source })?;
    info!(%spec, num_cons = compiled.num_constraints(), "compiled circuit");

    if let Some(cache) = cache {
        match cache.store(&compiled, &fingerprint) {
            Ok(()) => info!(%spec, path = %cache.path(spec).display(), "stored circuit"),
            Err(err) => warn!(%spec, error = %err, "failed to store circuit"),
        }
    }
    Ok((Arc::new(compiled), false))
}
