use std::sync::Arc;
use tracing::info;
use crate::core::error::Result;
use crate::index::index::{Index, IndexOptionsRequest};
use crate::schema::registry::Registry;
use crate::storage::backup::IndexBackup;

/// Owns every live index.
pub struct Holder {
    indexes: Registry<Index>,
    default_shard_count: u64,
}

impl Holder {
    pub fn new(default_shard_count: u64) -> Self {
        Holder { indexes: Registry::new("index"), default_shard_count }
    }

    pub fn create_index(&self, name: &str, request: IndexOptionsRequest) -> Result<Arc<Index>> {
        let options = request.validate(self.default_shard_count)?;
        let index = self.indexes.insert_with(name, || Index::new(name, options))?;
        info!(index = name, shards = options.shard_count, keys = options.keys, "index created");
        Ok(index)
    }

    /// Removes the index and all of its data. Terminal: a later create with
    /// the same name starts empty.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        let index = self.indexes.remove(name)?;
        index.mark_deleted();
        info!(index = name, "index deleted");
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<Arc<Index>> {
        let index = self.indexes.require(name)?;
        index.ensure_active()?;
        Ok(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.contains(name)
    }

    /// Indexes ordered by name.
    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.snapshot().values().cloned().collect()
    }

    pub fn restore(&self, backup: &IndexBackup) -> Result<Arc<Index>> {
        let index = self.indexes.insert_with(&backup.name, || Index::restore(backup))?;
        info!(index = %backup.name, fields = backup.fields.len(), "index restored");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::schema::field::FieldOptionsRequest;

    #[test]
    fn recreate_after_delete_starts_empty() {
        let holder = Holder::new(2);
        let index = holder.create_index("i", IndexOptionsRequest::default()).unwrap();
        index.create_field("f", FieldOptionsRequest::default()).unwrap();
        holder.delete_index("i").unwrap();

        assert_eq!(holder.index("i").unwrap_err().kind, ErrorKind::NotFound);
        assert!(index.ensure_active().is_err());

        let fresh = holder.create_index("i", IndexOptionsRequest::default()).unwrap();
        assert!(fresh.fields().is_empty());
    }

    #[test]
    fn names_are_validated_and_unique() {
        let holder = Holder::new(2);
        assert!(holder.create_index("Bad", IndexOptionsRequest::default()).unwrap_err().is_schema());
        holder.create_index("ok", IndexOptionsRequest::default()).unwrap();
        let err = holder.create_index("ok", IndexOptionsRequest::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(holder.delete_index("missing").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn restore_from_backup() {
        let holder = Holder::new(2);
        let index = holder.create_index("src", IndexOptionsRequest::default()).unwrap();
        let field = index.create_field("f", FieldOptionsRequest::default()).unwrap();
        field.set_bit(index.shard_for(3), 1, 3, None).unwrap();
        let backup = index.backup().unwrap();

        assert_eq!(holder.restore(&backup).unwrap_err().kind, ErrorKind::Conflict);
        holder.delete_index("src").unwrap();
        let restored = holder.restore(&backup).unwrap();
        let field = restored.field("f").unwrap();
        assert_eq!(field.row(restored.shard_for(3), 1).unwrap().to_vec(), vec![3]);
    }
}
