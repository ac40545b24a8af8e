//! Ordered multi-record (concatenated POTCAR) I/O.
//!
//! # Invariants
//! - Output is the verbatim concatenation of each payload in caller order.
//! - Validation happens before the first byte is written: every payload must
//!   split back into exactly itself, and all but the last must end with a
//!   line break.
//! - `read(write(w))` yields the hashes of `w` in the same order.

use super::potcar_io::PotcarIo;
use crate::model::format::{ends_with_line_break, is_single_record, split_records};
use crate::model::potcar::PotcarHash;
use crate::service::potcar_service::PotcarService;
use crate::service::{ServiceError, ServiceResult};
use log::info;
use std::io::Write;
use std::path::Path;

/// Ordered sequence of single-record wrappers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiPotcarIo {
    potcars: Vec<PotcarIo>,
}

impl MultiPotcarIo {
    pub fn new(potcars: Vec<PotcarIo>) -> Self {
        Self { potcars }
    }

    pub fn potcars(&self) -> &[PotcarIo] {
        &self.potcars
    }

    pub fn hashes(&self) -> Vec<&PotcarHash> {
        self.potcars.iter().map(PotcarIo::hash).collect()
    }

    pub fn len(&self) -> usize {
        self.potcars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.potcars.is_empty()
    }

    /// Concatenated payloads, checked for availability and boundaries.
    pub fn to_bytes(&self) -> ServiceResult<Vec<u8>> {
        let payloads = self.checked_payloads()?;
        Ok(payloads.concat())
    }

    /// Writes the concatenated payloads to `dest`; returns the byte count.
    pub fn write<W: Write>(&self, dest: &mut W) -> ServiceResult<usize> {
        let bytes = self.to_bytes()?;
        dest.write_all(&bytes)
            .and_then(|()| dest.flush())
            .map_err(|err| ServiceError::io("<output stream>", err))?;
        info!(
            "event=multi_potcar_write module=io status=ok records={} bytes={}",
            self.potcars.len(),
            bytes.len()
        );
        Ok(bytes.len())
    }

    /// Writes the concatenated payloads to `path`, replacing the file.
    pub fn write_file(&self, path: &Path) -> ServiceResult<usize> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).map_err(|err| ServiceError::io(path, err))?;
        info!(
            "event=multi_potcar_write module=io status=ok records={} bytes={} path={}",
            self.potcars.len(),
            bytes.len(),
            path.display()
        );
        Ok(bytes.len())
    }

    /// Splits concatenated contents and resolves every record.
    pub fn read(service: &PotcarService<'_>, contents: &[u8]) -> ServiceResult<Self> {
        let segments = split_records(contents)?;
        let mut potcars = Vec::with_capacity(segments.len());
        for segment in segments {
            potcars.push(PotcarIo::resolve(service, segment)?);
        }
        let stored = potcars.iter().filter(|potcar| potcar.is_stored()).count();
        info!(
            "event=multi_potcar_read module=io status=ok records={} stored={}",
            potcars.len(),
            stored
        );
        Ok(Self { potcars })
    }

    pub fn read_file(service: &PotcarService<'_>, path: &Path) -> ServiceResult<Self> {
        let contents = std::fs::read(path).map_err(|err| ServiceError::io(path, err))?;
        Self::read(service, &contents)
    }

    fn checked_payloads(&self) -> ServiceResult<Vec<&[u8]>> {
        let last = self.potcars.len().saturating_sub(1);
        let mut payloads = Vec::with_capacity(self.potcars.len());
        for (index, potcar) in self.potcars.iter().enumerate() {
            let payload = potcar.content()?;
            if !is_single_record(payload) || (index < last && !ends_with_line_break(payload)) {
                return Err(ServiceError::UnterminatedRecord { index });
            }
            payloads.push(payload);
        }
        Ok(payloads)
    }
}

impl From<Vec<PotcarIo>> for MultiPotcarIo {
    fn from(value: Vec<PotcarIo>) -> Self {
        Self::new(value)
    }
}

impl IntoIterator for MultiPotcarIo {
    type Item = PotcarIo;
    type IntoIter = std::vec::IntoIter<PotcarIo>;

    fn into_iter(self) -> Self::IntoIter {
        self.potcars.into_iter()
    }
}
