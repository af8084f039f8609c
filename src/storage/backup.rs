use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ShardId;
use crate::storage::fragment::FragmentSnapshot;

const MAGIC: &[u8; 4] = b"BDXB";
const FORMAT_VERSION: u8 = 1;
// magic + version + compression + crc32 + raw length + body length
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Lz4,
}

impl CompressionType {
    fn tag(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            other => Err(corrupt(format!("unknown compression tag {}", other))),
        }
    }

    fn compress(&self, data: &[u8]) -> Vec<u8> {
        match self {
            CompressionType::None => data.to_vec(),
            CompressionType::Lz4 => lz4_flex::compress(data),
        }
    }

    fn decompress(&self, data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        match self {
            CompressionType::None => Ok(data.to_vec()),
            CompressionType::Lz4 => lz4_flex::decompress(data, raw_len)
                .map_err(|e| corrupt(format!("lz4: {}", e))),
        }
    }
}

/// Everything needed to rebuild one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBackup {
    pub name: String,
    pub keys: bool,
    pub shard_count: u64,
    pub created_at: DateTime<Utc>,
    pub column_keys: Vec<(String, u64)>,
    pub existence: Vec<FragmentSnapshot>,
    pub fields: Vec<FieldBackup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBackup {
    pub name: String,
    // JSON: the options type skips absent keys, which bincode cannot read back.
    pub options: String,
    pub row_keys: Vec<(String, u64)>,
    pub views: Vec<ViewBackup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewBackup {
    pub name: String,
    pub fragments: Vec<FragmentSnapshot>,
}

impl IndexBackup {
    pub fn shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = self
            .fields
            .iter()
            .flat_map(|field| field.views.iter())
            .flat_map(|view| view.fragments.iter().map(|fragment| fragment.shard))
            .collect();
        shards.sort_unstable();
        shards.dedup();
        shards
    }
}

fn corrupt(context: impl Into<String>) -> Error {
    Error::new(ErrorKind::Io, format!("corrupt backup: {}", context.into()))
}

/// Layout: magic, version, compression tag, crc32 of the raw payload,
/// raw length, body length, body. Integers are little endian.
pub fn encode(backup: &IndexBackup, compression: CompressionType) -> Result<Vec<u8>> {
    let payload = bincode::serialize(backup)?;
    let checksum = crc32fast::hash(&payload);
    let body = compression.compress(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(compression.tag());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<IndexBackup> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err(corrupt("missing header"));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported version {}", bytes[4])));
    }
    let compression = CompressionType::from_tag(bytes[5])?;
    let checksum = u32::from_le_bytes(read_array(&bytes[6..10])?);
    let raw_len = u64::from_le_bytes(read_array(&bytes[10..18])?) as usize;
    let body_len = u64::from_le_bytes(read_array(&bytes[18..26])?) as usize;

    let body = bytes
        .get(HEADER_LEN..HEADER_LEN + body_len)
        .ok_or_else(|| corrupt("truncated body"))?;
    let payload = compression.decompress(body, raw_len)?;
    if crc32fast::hash(&payload) != checksum {
        return Err(corrupt("checksum mismatch"));
    }
    Ok(bincode::deserialize(&payload)?)
}

fn read_array<const N: usize>(slice: &[u8]) -> Result<[u8; N]> {
    slice.try_into().map_err(|_| corrupt("short header field"))
}

pub fn write_backup(path: &Path, backup: &IndexBackup, compression: CompressionType) -> Result<()> {
    let bytes = encode(backup, compression)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    info!(index = %backup.name, path = %path.display(), bytes = bytes.len(), "backup written");
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<IndexBackup> {
    let bytes = fs::read(path)?;
    let backup = decode(&bytes)?;
    debug!(index = %backup.name, fields = backup.fields.len(), "backup read");
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fragment::Fragment;

    fn sample() -> IndexBackup {
        let mut fragment = Fragment::rows(1, false);
        fragment.set_bit(4, 17).unwrap();
        IndexBackup {
            name: "people".into(),
            keys: false,
            shard_count: 4,
            created_at: Utc::now(),
            column_keys: vec![],
            existence: vec![],
            fields: vec![FieldBackup {
                name: "tags".into(),
                options: r#"{"type":"set"}"#.into(),
                row_keys: vec![("red".into(), 1)],
                views: vec![ViewBackup {
                    name: "standard".into(),
                    fragments: vec![fragment.snapshot().unwrap()],
                }],
            }],
        }
    }

    #[test]
    fn encodes_with_each_compression() {
        for compression in [CompressionType::None, CompressionType::Lz4] {
            let bytes = encode(&sample(), compression).unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded.name, "people");
            assert_eq!(decoded.shards(), vec![1]);
            assert_eq!(decoded.fields[0].row_keys, vec![("red".to_string(), 1)]);
        }
    }

    #[test]
    fn detects_corruption() {
        let mut bytes = encode(&sample(), CompressionType::None).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(decode(&bytes).unwrap_err().kind, ErrorKind::Io);
        assert!(decode(b"nope").is_err());
        assert!(decode(&bytes[..HEADER_LEN + 2]).is_err());
    }
}
