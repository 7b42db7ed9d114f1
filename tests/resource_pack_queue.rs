//! Resource pack queue behaviour, serving and downloading side

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bedrock_client::core::packet::{ResourcePackEntry, ResourcePacksInfo};
use bedrock_client::error::ProtocolError;
use bedrock_client::protocol::resource_pack::{ChunkProgress, ResourcePack, ResourcePackQueue};
use bytes::Bytes;
use proptest::prelude::*;

fn pack(uuid: &str, version: &str, len: usize) -> ResourcePack {
    let content: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    ResourcePack::new(uuid, version, Bytes::from(content))
}

fn catalog() -> ResourcePackQueue {
    ResourcePackQueue::new([pack("A", "1.0", 1000), pack("B", "2.0", 10)]).with_chunk_size(256)
}

/// A downloading queue that knows `packs` only by their metadata
fn downloader(packs: &[ResourcePack]) -> ResourcePackQueue {
    let info = ResourcePacksInfo {
        behaviour_packs: packs
            .iter()
            .map(|p| ResourcePackEntry {
                uuid: p.uuid().to_string(),
                version: p.version().to_string(),
                size: p.size(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    ResourcePackQueue::from_info(&info)
}

// ============================================================================
// Requests
// ============================================================================

#[test]
fn test_request_then_download_one_pack() {
    let mut queue = catalog();
    queue.request(&["A_1.0"]).unwrap();
    assert_eq!(queue.pending(), vec!["A_1.0".to_string()]);
    assert!(!queue.all_downloaded());

    let info = queue.next_pack().unwrap().expect("A should be offered");
    assert_eq!(info.uuid, "A_1.0");
    assert_eq!(info.size, 1000);
    assert_eq!(info.chunk_count, 4, "ceil(1000 / 256)");

    let mut last = None;
    for index in 0..info.chunk_count {
        let chunk = queue.next_chunk("A_1.0", index).unwrap();
        last = Some(queue.deliver_chunk(&chunk).unwrap());
    }

    match last {
        Some(ChunkProgress::Complete(verified)) => {
            assert_eq!(verified.identifier(), "A_1.0");
            assert_eq!(verified.size(), 1000);
        }
        other => panic!("expected a verified pack, got {other:?}"),
    }
    assert!(queue.all_downloaded());
    assert_eq!(queue.downloaded().len(), 1);
}

#[test]
fn test_unknown_pack_request_is_rejected() {
    let mut queue = catalog();
    let before = queue.all_downloaded();

    let error = queue.request(&["C_1.0"]).expect_err("C is not offered");
    assert!(matches!(error, ProtocolError::UnknownResourcePack(ref id) if id == "C_1.0"));
    assert!(error.to_string().contains("C_1.0"));
    assert_eq!(queue.all_downloaded(), before);
    assert!(queue.pending().is_empty());
}

#[test]
fn test_failed_request_keeps_previous_request() {
    let mut queue = catalog();
    queue.request(&["B_2.0"]).unwrap();

    assert!(queue.request(&["A_1.0", "C_1.0"]).is_err());
    assert_eq!(queue.pending(), vec!["B_2.0".to_string()]);
}

#[test]
fn test_offered_lists_catalog_sorted() {
    let queue = catalog();
    assert_eq!(queue.offered(), vec!["A_1.0".to_string(), "B_2.0".to_string()]);
}

#[test]
fn test_packs_are_served_in_request_order() {
    let mut queue = catalog();
    queue.request(&["B_2.0", "A_1.0"]).unwrap();

    let first = queue.next_pack().unwrap().unwrap();
    assert_eq!(first.uuid, "B_2.0");
    queue.next_chunk("B_2.0", 0).unwrap();

    let second = queue.next_pack().unwrap().unwrap();
    assert_eq!(second.uuid, "A_1.0");
}

#[test]
fn test_serving_every_pack_completes_the_queue() {
    let mut queue = catalog();
    queue.request(&["A_1.0", "B_2.0"]).unwrap();

    let mut served = Vec::new();
    while let Some(info) = queue.next_pack().unwrap() {
        assert!(!queue.all_downloaded(), "{} is still being served", info.uuid);
        for index in 0..info.chunk_count {
            let chunk = queue.next_chunk(&info.uuid, index).unwrap();
            assert_eq!(chunk.chunk_index, index);
        }
        served.push(info.uuid);
    }

    assert_eq!(served, ["A_1.0", "B_2.0"]);
    assert_eq!(queue.current(), None);
    assert!(queue.all_downloaded(), "nothing is left to serve");
    assert!(queue.downloaded().is_empty(), "serving verifies nothing locally");
}

#[test]
fn test_chunks_are_served_in_order() {
    let mut queue = catalog();
    queue.request(&["A_1.0", "B_2.0"]).unwrap();
    let info = queue.next_pack().unwrap().unwrap();
    assert_eq!(info.chunk_count, 4);

    let error = queue
        .next_chunk("A_1.0", info.chunk_count - 1)
        .expect_err("the last chunk cannot be served first");
    assert!(matches!(
        error,
        ProtocolError::ChunkOutOfOrder {
            ref pack,
            expected: 0,
            got: 3,
        } if pack == "A_1.0"
    ));
    assert_eq!(queue.current(), Some("A_1.0"), "A stays current");
    assert!(matches!(
        queue.next_pack(),
        Err(ProtocolError::ResourcePackError(_))
    ));

    let first = queue.next_chunk("A_1.0", 0).unwrap();
    assert_eq!(first.data_offset, 0);
    assert!(queue.next_chunk("A_1.0", 0).is_err(), "chunk 0 was already served");
}

// ============================================================================
// Downloading
// ============================================================================

#[test]
fn test_out_of_order_chunk_does_not_advance() {
    let source = pack("A", "1.0", 600);
    let mut server = ResourcePackQueue::new([source.clone()]).with_chunk_size(256);
    server.request(&["A_1.0"]).unwrap();
    let info = server.next_pack().unwrap().unwrap();
    let chunks: Vec<_> = (0..info.chunk_count)
        .map(|i| server.next_chunk("A_1.0", i).unwrap())
        .collect();

    let mut client = downloader(&[source]);
    client.request(&["A_1.0"]).unwrap();
    assert_eq!(
        client.begin_download(&info).unwrap(),
        ChunkProgress::Pending { next_index: 0 }
    );

    assert!(matches!(
        client.deliver_chunk(&chunks[1]),
        Err(ProtocolError::ChunkOutOfOrder {
            expected: 0,
            got: 1,
            ..
        })
    ));
    // The rejected chunk left the transfer where it was
    assert_eq!(
        client.deliver_chunk(&chunks[0]).unwrap(),
        ChunkProgress::Pending { next_index: 1 }
    );
}

#[test]
fn test_all_downloaded_flips_on_last_pack() {
    let packs = [pack("A", "1.0", 300), pack("B", "2.0", 100)];
    let mut server = ResourcePackQueue::new(packs.clone()).with_chunk_size(128);
    let mut client = downloader(&packs);
    server.request(&["A_1.0", "B_2.0"]).unwrap();
    client.request(&["A_1.0", "B_2.0"]).unwrap();

    while let Some(info) = server.next_pack().unwrap() {
        assert!(!client.all_downloaded());
        client.begin_download(&info).unwrap();
        for index in 0..info.chunk_count {
            let chunk = server.next_chunk(&info.uuid, index).unwrap();
            client.deliver_chunk(&chunk).unwrap();
        }
    }

    assert!(client.all_downloaded());
    let downloaded: Vec<String> = client.downloaded().iter().map(|p| p.identifier()).collect();
    assert_eq!(downloaded, ["A_1.0", "B_2.0"]);
}

#[test]
fn test_corrupted_pack_fails_verification() {
    let source = pack("A", "1.0", 300);
    let mut server = ResourcePackQueue::new([source.clone()]).with_chunk_size(128);
    server.request(&["A_1.0"]).unwrap();
    let mut info = server.next_pack().unwrap().unwrap();
    info.hash[0] ^= 0xFF;

    let mut client = downloader(&[source]);
    client.request(&["A_1.0"]).unwrap();
    client.begin_download(&info).unwrap();

    let mut result = Ok(ChunkProgress::Pending { next_index: 0 });
    for index in 0..info.chunk_count {
        let chunk = server.next_chunk("A_1.0", index).unwrap();
        result = client.deliver_chunk(&chunk);
    }
    assert!(matches!(result, Err(ProtocolError::ChecksumMismatch(ref id)) if id == "A_1.0"));
    assert!(client.downloaded().is_empty());
}

#[test]
fn test_unrequested_pack_cannot_be_downloaded() {
    let source = pack("A", "1.0", 10);
    let mut server = ResourcePackQueue::new([source.clone()]);
    server.request(&["A_1.0"]).unwrap();
    let info = server.next_pack().unwrap().unwrap();

    let mut client = downloader(&[source]);
    assert!(matches!(
        client.begin_download(&info),
        Err(ProtocolError::UnknownResourcePack(_))
    ));
}

#[test]
fn test_second_download_waits_for_first() {
    let packs = [pack("A", "1.0", 300), pack("B", "2.0", 100)];
    let mut server = ResourcePackQueue::new(packs.clone()).with_chunk_size(128);
    server.request(&["A_1.0", "B_2.0"]).unwrap();
    let a = server.next_pack().unwrap().unwrap();

    let mut client = downloader(&packs);
    client.request(&["A_1.0", "B_2.0"]).unwrap();
    client.begin_download(&a).unwrap();
    assert_eq!(client.current(), Some("A_1.0"));

    let b_info = {
        let mut other = ResourcePackQueue::new([packs[1].clone()]).with_chunk_size(128);
        other.request(&["B_2.0"]).unwrap();
        other.next_pack().unwrap().unwrap()
    };
    assert!(matches!(
        client.begin_download(&b_info),
        Err(ProtocolError::ResourcePackError(_))
    ));
    assert_eq!(client.pending(), vec!["B_2.0".to_string()]);
}

// ============================================================================
// Properties
// ============================================================================

fn catalog_of(count: usize) -> Vec<ResourcePack> {
    (0..count)
        .map(|i| pack(&format!("pack-{i}"), "1.0", 50 + i * 37))
        .collect()
}

proptest! {
    #[test]
    fn prop_subset_requests_download_each_pack_once(mask in prop::collection::vec(any::<bool>(), 1..8)) {
        let packs = catalog_of(mask.len());
        let wanted: Vec<String> = packs
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(p, _)| p.identifier())
            .collect();

        let mut queue = ResourcePackQueue::new(packs).with_chunk_size(64);
        prop_assert!(queue.request(&wanted).is_ok());

        let mut served = Vec::new();
        while let Some(info) = queue.next_pack().unwrap() {
            for index in 0..info.chunk_count {
                let chunk = queue.next_chunk(&info.uuid, index).unwrap();
                queue.deliver_chunk(&chunk).unwrap();
            }
            served.push(info.uuid);
        }
        prop_assert_eq!(served, wanted);
        prop_assert!(queue.all_downloaded());
    }
}

proptest! {
    #[test]
    fn prop_unresolvable_request_changes_nothing(
        mask in prop::collection::vec(any::<bool>(), 1..8),
        bogus in "[a-z]{1,8}_9\\.9",
    ) {
        let packs = catalog_of(mask.len());
        let mut queue = ResourcePackQueue::new(packs.clone());
        queue.request(&[packs[0].identifier()]).unwrap();
        let before = queue.pending();

        let mut ids: Vec<String> = packs
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(p, _)| p.identifier())
            .collect();
        ids.push(bogus);

        prop_assert!(queue.request(&ids).is_err());
        prop_assert_eq!(queue.pending(), before);
    }
}

proptest! {
    #[test]
    fn prop_in_order_delivery_verifies(
        content in prop::collection::vec(any::<u8>(), 1..5000),
        chunk_size in 1u32..2048,
    ) {
        let source = ResourcePack::new("P", "1.0", Bytes::from(content.clone()));
        let mut server = ResourcePackQueue::new([source.clone()]).with_chunk_size(chunk_size);
        server.request(&["P_1.0"]).unwrap();
        let info = server.next_pack().unwrap().unwrap();

        let mut client = downloader(&[source]);
        client.request(&["P_1.0"]).unwrap();
        let mut progress = client.begin_download(&info).unwrap();
        let mut index = 0;
        while let ChunkProgress::Pending { next_index } = progress {
            prop_assert_eq!(next_index, index);
            let chunk = server.next_chunk("P_1.0", next_index).unwrap();
            progress = client.deliver_chunk(&chunk).unwrap();
            index += 1;
        }

        prop_assert_eq!(index, info.chunk_count);
        match progress {
            ChunkProgress::Complete(pack) => {
                prop_assert_eq!(pack.content().unwrap().as_ref(), content.as_slice());
            }
            ChunkProgress::Pending { .. } => prop_assert!(false, "transfer did not finish"),
        }
        prop_assert!(client.all_downloaded());
    }
}
