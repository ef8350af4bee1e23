use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

/// Pretty JSON persistence for manifests, input maps and other serde types.
pub trait JsonSerializable: Sized {
    fn serialize_to_file(&self, path: &Path) -> io::Result<()>;
    fn deserialize_from_file(path: &Path) -> io::Result<Self>;
}

impl<T: Serialize + DeserializeOwned> JsonSerializable for T {
    fn serialize_to_file(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    fn deserialize_from_file(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
