//! Self-describing columnar formats: Parquet and Avro.

use color_eyre::Result;
use polars::io::avro::AvroReader;
use polars::prelude::*;
use std::io::Cursor;

use crate::error::DataQueryError;

pub fn read_parquet(name: &str, bytes: &[u8]) -> Result<DataFrame> {
    ParquetReader::new(Cursor::new(bytes.to_vec())).finish().map_err(|e| {
        DataQueryError::LoadFailed {
            name: name.to_string(),
            reason: format!("failed to read Parquet file: {e}"),
        }
        .report()
    })
}

pub fn read_avro(name: &str, bytes: &[u8]) -> Result<DataFrame> {
    AvroReader::new(Cursor::new(bytes.to_vec())).finish().map_err(|e| {
        DataQueryError::LoadFailed {
            name: name.to_string(),
            reason: format!("failed to read Avro file: {e}"),
        }
        .report()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::io::avro::AvroWriter;

    fn sample_df() -> DataFrame {
        let s1 = Series::new("a".into(), [1i64, 2, 3]);
        let s2 = Series::new("b".into(), ["x", "y", "z"]);
        DataFrame::new(vec![s1.into(), s2.into()]).unwrap()
    }

    #[test]
    fn test_parquet_bytes() {
        let mut df = sample_df();
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
        let back = read_parquet("t.parquet", &buf).unwrap();
        assert!(back.equals(&df));
    }

    #[test]
    fn test_avro_bytes() {
        let mut df = sample_df();
        let mut buf = Vec::new();
        AvroWriter::new(&mut buf).finish(&mut df).unwrap();
        let back = read_avro("t.avro", &buf).unwrap();
        assert_eq!(back.shape(), (3, 2));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(read_parquet("x.parquet", b"nope").is_err());
        assert!(read_avro("x.avro", b"nope").is_err());
    }
}
