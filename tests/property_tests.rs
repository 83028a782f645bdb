//! Property-based tests for the index document and store round trips.
//!
//! These tests use proptest to verify invariants hold across randomly
//! generated indexes.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use gh1000::core::metadata::{Index, RepoMetadata};
use gh1000::core::types::{Cid, RepoLink};
use gh1000::index::{decode, encode, IndexStore, RecordSettings};
use gh1000::store::MemoryStore;

/// Strategy for repository links such as `owner/name`.
fn repo_link() -> impl Strategy<Value = RepoLink> {
    "[a-zA-Z0-9][a-zA-Z0-9_.-]{0,15}/[a-zA-Z0-9][a-zA-Z0-9_.-]{0,15}"
        .prop_map(|s| RepoLink::new(s).unwrap())
}

/// Strategy for content identifiers.
fn cid() -> impl Strategy<Value = Cid> {
    "Qm[1-9A-HJ-NP-Za-km-z]{44}".prop_map(|s| Cid::new(s).unwrap())
}

/// Strategy for timestamps between 1970 and 2100, with sub-second parts.
fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, prop_oneof![Just(0u32), 0u32..1_000_000_000])
        .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
}

fn metadata() -> impl Strategy<Value = RepoMetadata> {
    (
        "https://[a-z]{1,10}\\.com/[a-z0-9/_-]{1,30}",
        any::<u64>(),
        any::<u64>(),
        timestamp(),
        proptest::option::of(cid()),
    )
        .prop_map(|(url, rank, stars, fetched, archive)| RepoMetadata {
            source_url: url,
            rank,
            star_count: stars,
            last_fetched_at: fetched,
            archive_ref: archive,
        })
}

fn entries() -> impl Strategy<Value = Vec<(RepoLink, RepoMetadata)>> {
    prop::collection::vec((repo_link(), metadata()), 0..20)
}

fn settings() -> RecordSettings {
    RecordSettings {
        key_name: "gh1000".into(),
        lifetime: Duration::from_secs(2400 * 3600),
        ttl: Duration::from_secs(3600),
    }
}

proptest! {
    /// decode(encode(m)) == m
    #[test]
    fn document_round_trip(entries in entries()) {
        let index: Index = entries.into_iter().collect();
        let decoded = decode(&encode(&index)).unwrap();
        prop_assert_eq!(decoded, index);
    }

    /// Encoding does not depend on insertion order.
    #[test]
    fn encoding_is_order_independent(entries in entries()) {
        let forward: Index = entries.iter().cloned().collect();
        let backward: Index = entries.iter().rev().cloned().collect();
        // Later duplicates win on insert, so compare on distinct keys only.
        prop_assume!(forward == backward);
        prop_assert_eq!(encode(&forward), encode(&backward));
    }

    /// Re-encoding a decoded document reproduces it byte for byte.
    #[test]
    fn reencoding_is_stable(entries in entries()) {
        let index: Index = entries.into_iter().collect();
        let doc = encode(&index);
        prop_assert_eq!(encode(&decode(&doc).unwrap()), doc);
    }

    /// retrieve(save(m)) == m through a content store.
    #[test]
    fn store_round_trip(entries in entries()) {
        let index: Index = entries.into_iter().collect();
        let retrieved = tokio_test::block_on(async {
            let store = MemoryStore::new().with_key("gh1000");
            let index_store = IndexStore::connect(&store, settings()).await.unwrap();
            index_store.save(&index).await.unwrap();
            index_store.retrieve().await.unwrap()
        });
        prop_assert_eq!(retrieved, index);
    }

    /// Saving the same index twice publishes the same document.
    #[test]
    fn identical_indexes_share_a_document(entries in entries()) {
        let index: Index = entries.into_iter().collect();
        let (first, second) = tokio_test::block_on(async {
            let store = MemoryStore::new().with_key("gh1000");
            let index_store = IndexStore::connect(&store, settings()).await.unwrap();
            let first = index_store.save(&index).await.unwrap();
            let second = index_store.save(&index.clone()).await.unwrap();
            (first, second)
        });
        prop_assert_eq!(first, second);
    }
}

#[test]
fn purge_then_retrieve_is_empty() {
    tokio_test::block_on(async {
        let store = MemoryStore::new().with_key("gh1000");
        let index_store = IndexStore::connect(&store, settings()).await.unwrap();

        let mut index = Index::new();
        index.insert(
            RepoLink::new("a/b").unwrap(),
            RepoMetadata::new(
                "https://example.com/a/b",
                5,
                10,
                Utc.with_ymd_and_hms(2022, 4, 5, 11, 40, 0).unwrap(),
            ),
        );
        index_store.save(&index).await.unwrap();

        index_store.save(&Index::new()).await.unwrap();
        assert_eq!(index_store.retrieve().await.unwrap(), Index::new());
    });
}
