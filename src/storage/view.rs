use std::collections::BTreeMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::core::error::Result;
use crate::core::types::ShardId;
use crate::storage::fragment::{Fragment, FragmentSnapshot};

/// How new fragments of a view are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentTemplate {
    Rows { exclusive: bool },
    Bsi { min: i64, max: i64 },
}

impl FragmentTemplate {
    fn build(&self, shard: ShardId) -> Fragment {
        match *self {
            FragmentTemplate::Rows { exclusive } => Fragment::rows(shard, exclusive),
            FragmentTemplate::Bsi { min, max } => Fragment::bsi(shard, min, max),
        }
    }

    fn exclusive(&self) -> bool {
        matches!(self, FragmentTemplate::Rows { exclusive: true })
    }
}

pub type SharedFragment = Arc<RwLock<Fragment>>;

/// A named group of fragments, one per shard that has ever been written.
pub struct View {
    name: String,
    template: FragmentTemplate,
    fragments: RwLock<BTreeMap<ShardId, SharedFragment>>,
}

impl View {
    pub fn new(name: impl Into<String>, template: FragmentTemplate) -> Self {
        View { name: name.into(), template, fragments: RwLock::new(BTreeMap::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragment(&self, shard: ShardId) -> Option<SharedFragment> {
        self.fragments.read().get(&shard).cloned()
    }

    pub fn fragment_or_create(&self, shard: ShardId) -> SharedFragment {
        if let Some(fragment) = self.fragment(shard) {
            return fragment;
        }
        self.fragments
            .write()
            .entry(shard)
            .or_insert_with(|| Arc::new(RwLock::new(self.template.build(shard))))
            .clone()
    }

    pub fn shards(&self) -> Vec<ShardId> {
        self.fragments.read().keys().copied().collect()
    }

    pub fn snapshot(&self) -> Result<Vec<FragmentSnapshot>> {
        let fragments: Vec<SharedFragment> = self.fragments.read().values().cloned().collect();
        fragments.iter().map(|fragment| fragment.read().snapshot()).collect()
    }

    pub fn restore(&self, snapshots: &[FragmentSnapshot]) -> Result<()> {
        let mut restored = BTreeMap::new();
        for snapshot in snapshots {
            let fragment = Fragment::restore(snapshot, self.template.exclusive())?;
            restored.insert(snapshot.shard, Arc::new(RwLock::new(fragment)));
        }
        *self.fragments.write() = restored;
        Ok(())
    }
}
