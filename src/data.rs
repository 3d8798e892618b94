//! Functions for data io.
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Read and write a value as a JSON file.
pub trait JSON: Sized {
    fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    fn read_json<P: AsRef<Path>>(path: P) -> Result<Self>;
}

impl<T: Serialize + DeserializeOwned> JSON for T {
    fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
