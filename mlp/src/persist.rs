use std::fs::File;
use std::io::{BufReader, BufWriter, Error as IoError, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::network::{Network, NetworkData, NetworkError};

impl From<IoError> for NetworkError {
    fn from(error: IoError) -> Self {
        NetworkError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(error: serde_json::Error) -> Self {
        if error.is_io() {
            NetworkError::Io(error.to_string())
        } else {
            NetworkError::Serialization(error.to_string())
        }
    }
}

/// JSON persistence of trained weights. Cached forward passes are not saved.
impl Network {
    pub fn to_json(&self) -> Result<String, NetworkError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a network, rejecting layers that do not chain.
    pub fn from_json(json: &str) -> Result<Self, NetworkError> {
        let data: NetworkData = serde_json::from_str(json)?;
        Self::try_from(data)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<(), NetworkError> {
        Ok(serde_json::to_writer(writer, self)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, NetworkError> {
        let data: NetworkData = serde_json::from_reader(reader)?;
        Self::try_from(data)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NetworkError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;

        debug!(?path, "Network saved.");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let path = path.as_ref();
        let network = Self::from_reader(BufReader::new(File::open(path)?))?;

        debug!(?path, "Network loaded.");
        Ok(network)
    }
}
