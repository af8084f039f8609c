pub mod core;
pub mod bitmap;
pub mod schema;
pub mod storage;
pub mod index;
pub mod cluster;
pub mod query;
pub mod sql;
pub mod api;

pub use crate::core::config::Config;
pub use crate::core::database::{ClusterStatus, Database};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::QueryOptions;

/*
┌──────────────────────────────────────────────────────────────────────────────────────┐
│                               BITDEX STRUCT ARCHITECTURE                             │
└──────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── API LAYER ───────────────────────────────────────┐
│  struct Handler                          trait Authenticator                         │
│  • db: Arc<Database>                     • StaticToken (bearer)                      │
│  • auth: Arc<dyn Authenticator>          • AllowAll                                  │
│  ApiRequest { method, path, query, token, body } -> ApiResponse { status, body }     │
└──────────────────────────────────────────────────────────────────────────────────────┘
                                          │
┌──────────────────────────────────── CORE LAYER ──────────────────────────────────────┐
│  struct Database                                                                     │
│  • config: Config              • holder: Arc<Holder>                                 │
│  • cluster: Arc<dyn ClusterView>                                                     │
│  • executor: Arc<Executor>     • sql: SqlEngine                                      │
│  Error { kind: ErrorKind, context, position }    Deadline    QueryOptions            │
└──────────────────────────────────────────────────────────────────────────────────────┘
              │                                             │
┌──────────── SQL LAYER ─────────────┐   ┌──────────────── PQL LAYER ───────────────────┐
│ tokenize -> parse -> Statement     │   │ parse (nom) -> Vec<Call>   ParseCache (lru)  │
│ Planner: Statement -> Plan         │──▶│ Executor: Call -> RowPlan per shard          │
│   WHERE -> PQL Call tree           │   │   Set/Clear/Row/Range/Union/Intersect/...    │
│ SqlEngine: Plan -> ResultSet       │   │   Count/TopN/Sum/Min/Max/Options             │
└────────────────────────────────────┘   └──────────────────────────────────────────────┘
                                          │
┌────────────────────────────────── CLUSTER LAYER ─────────────────────────────────────┐
│  struct Coordinator { pool: rayon::ThreadPool, cluster: Arc<dyn ClusterView> }       │
│  • fan_out(shards) -> Partial<T> { value, missing }   • route_write(shard)           │
│  merge: union rows, add counts, combine ValCount, merge TopN pairs                   │
│  LocalCluster: per-shard availability -> ClusterState NORMAL | DEGRADED              │
└──────────────────────────────────────────────────────────────────────────────────────┘
                                          │
┌─────────────────────────────────── INDEX LAYER ──────────────────────────────────────┐
│  Holder { indexes: Registry<Index> }   Registry: copy-on-write Arc snapshot          │
│  Index { options, fields: Registry<Field>, column_keys, existence: View }           │
│  Field { options snapshot, views: standard | bsig | time quanta, row keys }          │
└──────────────────────────────────────────────────────────────────────────────────────┘
                                          │
┌────────────────────────────── SCHEMA / STORAGE / BITMAP ─────────────────────────────┐
│  FieldType: set | int | mutex | time | bool      TimeQuantum "YMDH"                  │
│  View -> RwLock<Fragment> per shard: BTreeMap<RowId, Row> | BsiGroup                 │
│  Row (RoaringTreemap)    BsiGroup: exists + sign + bit planes                        │
│  backup: bincode + crc32fast + lz4_flex                                              │
└──────────────────────────────────────────────────────────────────────────────────────┘
*/
