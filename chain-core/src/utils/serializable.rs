use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use eyre::{Result, WrapErr};

/// Compressed ark encoding for proofs, public inputs and recursion artifacts.
pub trait Serializable: CanonicalSerialize + CanonicalDeserialize + Sized {
    /// Encoded size in bytes.
    fn size(&self) -> usize {
        self.compressed_size()
    }

    fn serialize_to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.size());
        self.serialize_compressed(&mut bytes)
            .wrap_err("failed to encode")?;
        Ok(bytes)
    }

    fn deserialize_from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize_compressed(bytes).wrap_err("failed to decode")
    }

    /// Writes the encoding to `path`, creating parent directories.
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file =
            File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.serialize_compressed(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).wrap_err_with(|| format!("cannot open {}", path.display()))?;
        Self::deserialize_compressed(BufReader::new(file))
            .wrap_err_with(|| format!("cannot decode {}", path.display()))
    }
}
