//! Binary `.rel`/`.ceg` row files: `arity × row_count` little-endian 32-bit
//! signed integers, row-major. Both formats are byte-identical; `.ceg`
//! differs only in which records it holds (counterexamples, not facts).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::KbIoError;
use crate::kb::record::Record;

pub fn read(path: &Path, arity: usize, row_count: usize) -> Result<Vec<Record>, KbIoError> {
    let mut file = File::open(path).map_err(|e| KbIoError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| KbIoError::io(path, e))?;

    let expected_bytes = arity * row_count * 4;
    if bytes.len() != expected_bytes {
        return Err(KbIoError::BadRelationFile {
            path: path.to_path_buf(),
            expected: arity * row_count,
            found: bytes.len() / 4,
        });
    }

    let mut records = Vec::with_capacity(row_count);
    for row in bytes.chunks_exact(arity * 4) {
        let values = row.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        records.push(Record::new(values));
    }
    Ok(records)
}

pub fn write<'a>(path: &Path, records: impl IntoIterator<Item = &'a Record>) -> Result<(), KbIoError> {
    let mut file = File::create(path).map_err(|e| KbIoError::io(path, e))?;
    for record in records {
        for &value in record.as_slice() {
            file.write_all(&value.to_le_bytes()).map_err(|e| KbIoError::io(path, e))?;
        }
    }
    Ok(())
}

/// `supplementary.cst`: a flat binary list of constant numerations, same
/// little-endian int32 encoding as a one-column `.rel` file.
pub fn read_int_list(path: &Path) -> Result<Vec<i32>, KbIoError> {
    let mut file = File::open(path).map_err(|e| KbIoError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| KbIoError::io(path, e))?;
    if bytes.len() % 4 != 0 {
        return Err(KbIoError::BadRelationFile {
            path: path.to_path_buf(),
            expected: bytes.len() / 4 + 1,
            found: bytes.len() / 4,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub fn write_int_list(path: &Path, values: &[i32]) -> Result<(), KbIoError> {
    let mut file = File::create(path).map_err(|e| KbIoError::io(path, e))?;
    for &value in values {
        file.write_all(&value.to_le_bytes()).map_err(|e| KbIoError::io(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.rel");
        let records = vec![Record::new(vec![1, 2, 3]), Record::new(vec![4, 5, 6])];
        write(&path, records.iter()).unwrap();
        let loaded = read(&path, 3, 2).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn wrong_row_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.rel");
        write(&path, [Record::new(vec![1, 2, 3])].iter()).unwrap();
        assert!(read(&path, 3, 2).is_err());
    }

    #[test]
    fn int_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supplementary.cst");
        write_int_list(&path, &[4, 5, 6, 16, 17]).unwrap();
        assert_eq!(read_int_list(&path).unwrap(), vec![4, 5, 6, 16, 17]);
    }
}
