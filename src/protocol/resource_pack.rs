//! Resource pack download queue.
//!
//! The queue holds the catalog of offered packs, the subset the peer asked for, and
//! the reassembly state of chunked transfers. Transfers are strictly one pack at a
//! time: a pack becomes current through [`ResourcePackQueue::next_pack`] (serving
//! side) or [`ResourcePackQueue::begin_download`] (receiving side), and stays current
//! until it has been fully served or verified.
//!
//! A pack is verified only when the reassembled byte count equals its declared size
//! and its SHA-256 matches the declared checksum.

use crate::config::{MAX_RESOURCE_PACK_SIZE, RESOURCE_PACK_CHUNK_SIZE};
use crate::core::packet::{
    ResourcePackChunkData, ResourcePackDataInfo, ResourcePackEntry, ResourcePacksInfo,
};
use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// One resource pack, either known by metadata only or with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePack {
    uuid: String,
    version: String,
    size: u64,
    content: Option<Bytes>,
    checksum: Option<[u8; 32]>,
}

impl ResourcePack {
    /// A pack whose content is available to serve
    pub fn new(uuid: impl Into<String>, version: impl Into<String>, content: Bytes) -> Self {
        let checksum = Sha256::digest(&content).into();
        Self {
            uuid: uuid.into(),
            version: version.into(),
            size: content.len() as u64,
            content: Some(content),
            checksum: Some(checksum),
        }
    }

    /// A pack known only from the peer's offer
    pub fn from_entry(entry: &ResourcePackEntry) -> Self {
        Self {
            uuid: entry.uuid.clone(),
            version: entry.version.clone(),
            size: entry.size,
            content: None,
            checksum: None,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `"<uuid>_<version>"`
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.uuid, self.version)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn checksum(&self) -> Option<&[u8; 32]> {
        self.checksum.as_ref()
    }

    /// Number of `chunk_size` chunks the pack splits into
    pub fn chunk_count(&self, chunk_size: u32) -> Result<u32> {
        chunk_count(self.size, chunk_size)
    }
}

fn chunk_count(size: u64, chunk_size: u32) -> Result<u32> {
    if chunk_size == 0 {
        return Ok(0);
    }
    u32::try_from(size.div_ceil(u64::from(chunk_size))).map_err(|_| {
        ProtocolError::ResourcePackError(format!(
            "{}: {size} bytes in {chunk_size}-byte chunks",
            constants::ERR_PACK_TOO_LARGE
        ))
    })
}

/// Result of handing a chunk to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProgress {
    /// More chunks are needed; `next_index` is the one to request
    Pending { next_index: u32 },
    /// The pack is complete and verified
    Complete(Arc<ResourcePack>),
}

/// Reassembly state of one transfer
#[derive(Debug)]
struct DownloadingPack {
    pack: Arc<ResourcePack>,
    buf: Vec<u8>,
    chunk_size: u32,
    size: u64,
    expected_index: u32,
    checksum: [u8; 32],
}

/// The pack currently being transferred and the next chunk to serve
#[derive(Debug)]
struct Current {
    id: String,
    pack: Arc<ResourcePack>,
    next_index: u32,
    chunk_count: u32,
}

#[derive(Debug)]
pub struct ResourcePackQueue {
    catalog: HashMap<String, Arc<ResourcePack>>,
    requested: VecDeque<(String, Arc<ResourcePack>)>,
    current: Option<Current>,
    downloading: HashMap<String, DownloadingPack>,
    downloaded: Vec<Arc<ResourcePack>>,
    // Last pack handed out by next_pack; its chunks may be delivered back to this queue
    last_served: Option<String>,
    chunk_size: u32,
    max_pack_size: u64,
}

impl ResourcePackQueue {
    pub fn new(packs: impl IntoIterator<Item = ResourcePack>) -> Self {
        let catalog = packs
            .into_iter()
            .map(|pack| (pack.identifier(), Arc::new(pack)))
            .collect();
        Self {
            catalog,
            requested: VecDeque::new(),
            current: None,
            downloading: HashMap::new(),
            downloaded: Vec::new(),
            last_served: None,
            chunk_size: RESOURCE_PACK_CHUNK_SIZE,
            max_pack_size: MAX_RESOURCE_PACK_SIZE,
        }
    }

    /// Catalog built from a server's `ResourcePacksInfo`
    pub fn from_info(info: &ResourcePacksInfo) -> Self {
        Self::new(info.all_packs().map(ResourcePack::from_entry))
    }

    /// Chunk size used when serving packs
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Largest declared size accepted for a download
    pub fn with_max_pack_size(mut self, max_pack_size: u64) -> Self {
        self.max_pack_size = max_pack_size;
        self
    }

    /// Identifiers of every pack in the catalog, sorted
    pub fn offered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.catalog.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Identifiers still waiting for a transfer, in the order they will be taken
    pub fn pending(&self) -> Vec<String> {
        self.requested.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Identifier of the pack being transferred, if any
    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|current| current.id.as_str())
    }

    /// Packs verified so far, in completion order
    pub fn downloaded(&self) -> &[Arc<ResourcePack>] {
        &self.downloaded
    }

    /// Replace the requested set with `ids`.
    ///
    /// Every identifier is resolved before anything changes, so an unknown identifier
    /// fails the whole request and leaves the queue untouched. Duplicates are dropped.
    pub fn request<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut resolved = VecDeque::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let pack = self
                .catalog
                .get(id)
                .ok_or_else(|| ProtocolError::UnknownResourcePack(id.to_string()))?;
            if seen.insert(id) {
                resolved.push_back((id.to_string(), pack.clone()));
            }
        }

        debug!(count = resolved.len(), "Resource packs requested");
        self.requested = resolved;
        Ok(())
    }

    /// Take the next requested pack and start serving it.
    ///
    /// Returns `Ok(None)` when nothing is requested.
    pub fn next_pack(&mut self) -> Result<Option<ResourcePackDataInfo>> {
        if self.current.is_some() {
            return Err(ProtocolError::ResourcePackError(
                constants::ERR_PACK_IN_PROGRESS.into(),
            ));
        }
        let Some((id, pack)) = self.requested.front().cloned() else {
            return Ok(None);
        };
        let checksum = match (pack.content(), pack.checksum()) {
            (Some(_), Some(checksum)) => *checksum,
            _ => {
                return Err(ProtocolError::ResourcePackError(format!(
                    "{}: {id}",
                    constants::ERR_PACK_NO_CONTENT
                )))
            }
        };
        if self.chunk_size == 0 && pack.size() > 0 {
            return Err(ProtocolError::ResourcePackError(format!(
                "Cannot serve resource pack {id} in zero-byte chunks"
            )));
        }
        let chunk_count = pack.chunk_count(self.chunk_size)?;
        self.requested.pop_front();

        let info = ResourcePackDataInfo {
            uuid: id.clone(),
            data_chunk_size: self.chunk_size,
            chunk_count,
            size: pack.size(),
            hash: checksum.to_vec(),
        };

        debug!(pack = %info.uuid, size = info.size, chunks = chunk_count, "Serving resource pack");
        self.last_served = Some(id.clone());
        if chunk_count > 0 {
            self.current = Some(Current {
                id,
                pack,
                next_index: 0,
                chunk_count,
            });
        }
        Ok(Some(info))
    }

    /// Start receiving the pack announced by `info`.
    ///
    /// The pack must have been requested and no other pack may be in transfer.
    pub fn begin_download(&mut self, info: &ResourcePackDataInfo) -> Result<ChunkProgress> {
        if self.current.is_some() {
            return Err(ProtocolError::ResourcePackError(
                constants::ERR_PACK_IN_PROGRESS.into(),
            ));
        }
        let position = self
            .requested
            .iter()
            .position(|(id, _)| *id == info.uuid)
            .ok_or_else(|| ProtocolError::UnknownResourcePack(info.uuid.clone()))?;

        if info.size > self.max_pack_size {
            return Err(ProtocolError::ResourcePackError(format!(
                "{}: {} is {} bytes",
                constants::ERR_PACK_TOO_LARGE,
                info.uuid,
                info.size
            )));
        }
        if info.data_chunk_size == 0 && info.size > 0 {
            return Err(ProtocolError::ResourcePackError(format!(
                "Resource pack {} declares a zero chunk size",
                info.uuid
            )));
        }
        let checksum: [u8; 32] = info.hash.as_slice().try_into().map_err(|_| {
            ProtocolError::ResourcePackError(format!(
                "Resource pack {} declares a {}-byte checksum",
                info.uuid,
                info.hash.len()
            ))
        })?;

        let (id, pack) = self
            .requested
            .remove(position)
            .ok_or_else(|| ProtocolError::UnknownResourcePack(info.uuid.clone()))?;
        debug!(pack = %id, size = info.size, chunks = info.chunk_count, "Downloading resource pack");
        self.open_download(id.clone(), pack.clone(), info.data_chunk_size, info.size, checksum);
        self.current = Some(Current {
            id: id.clone(),
            pack,
            next_index: 0,
            chunk_count: info.chunk_count,
        });

        if info.size == 0 {
            return self.finish(&id);
        }
        Ok(ChunkProgress::Pending { next_index: 0 })
    }

    fn open_download(
        &mut self,
        id: String,
        pack: Arc<ResourcePack>,
        chunk_size: u32,
        size: u64,
        checksum: [u8; 32],
    ) {
        self.downloading.insert(
            id,
            DownloadingPack {
                pack,
                buf: Vec::with_capacity(size.min(u64::from(chunk_size) * 4) as usize),
                chunk_size,
                size,
                expected_index: 0,
                checksum,
            },
        );
    }

    /// Start reassembling the pack this queue last served, from its own catalog entry
    fn open_served(&mut self, id: &str) -> Result<()> {
        let served = self
            .last_served
            .as_deref()
            .filter(|served| *served == id)
            .and_then(|served| self.catalog.get(served))
            .cloned();
        let pack = served.ok_or_else(|| {
            ProtocolError::ResourcePackError(format!("{}: {id}", constants::ERR_PACK_NOT_CURRENT))
        })?;
        let checksum = pack.checksum().copied().ok_or_else(|| {
            ProtocolError::ResourcePackError(format!("{}: {id}", constants::ERR_PACK_NO_CONTENT))
        })?;
        self.last_served = None;
        let size = pack.size();
        self.open_download(id.to_string(), pack, self.chunk_size, size, checksum);
        Ok(())
    }

    /// Serve chunk `index` of the current pack.
    ///
    /// Chunks are served strictly in order. The pack stops being current once its
    /// last chunk has been served.
    pub fn next_chunk(&mut self, id: &str, index: u32) -> Result<ResourcePackChunkData> {
        let current = self
            .current
            .as_mut()
            .filter(|current| current.id == id)
            .ok_or_else(|| {
                ProtocolError::ResourcePackError(format!("{}: {id}", constants::ERR_PACK_NOT_CURRENT))
            })?;
        if index != current.next_index {
            return Err(ProtocolError::ChunkOutOfOrder {
                pack: id.to_string(),
                expected: current.next_index,
                got: index,
            });
        }
        let content = current.pack.content().ok_or_else(|| {
            ProtocolError::ResourcePackError(format!("{}: {id}", constants::ERR_PACK_NO_CONTENT))
        })?;

        let start = u64::from(index) * u64::from(self.chunk_size);
        if start >= content.len() as u64 {
            return Err(ProtocolError::ResourcePackError(format!(
                "{}: chunk {index} of {id}",
                constants::ERR_PACK_OVERRUN
            )));
        }
        let start = start as usize;
        let end = (start + self.chunk_size as usize).min(content.len());
        let data = content.slice(start..end);
        current.next_index += 1;

        if current.next_index >= current.chunk_count {
            debug!(pack = %id, chunks = current.chunk_count, "Resource pack served");
            self.current = None;
        }

        Ok(ResourcePackChunkData {
            uuid: id.to_string(),
            chunk_index: index,
            data_offset: start as u64,
            data,
        })
    }

    /// Append a received chunk to its pack's reassembly buffer
    pub fn deliver_chunk(&mut self, chunk: &ResourcePackChunkData) -> Result<ChunkProgress> {
        if !self.downloading.contains_key(&chunk.uuid) {
            self.open_served(&chunk.uuid)?;
        }
        let download = self.downloading.get_mut(&chunk.uuid).ok_or_else(|| {
            ProtocolError::ResourcePackError(format!(
                "{}: {}",
                constants::ERR_PACK_NOT_CURRENT,
                chunk.uuid
            ))
        })?;

        if chunk.chunk_index != download.expected_index {
            return Err(ProtocolError::ChunkOutOfOrder {
                pack: chunk.uuid.clone(),
                expected: download.expected_index,
                got: chunk.chunk_index,
            });
        }
        let new_len = download.buf.len() as u64 + chunk.data.len() as u64;
        if new_len > download.size {
            return Err(ProtocolError::ResourcePackError(format!(
                "{}: {} ({new_len} > {})",
                constants::ERR_PACK_OVERRUN,
                chunk.uuid,
                download.size
            )));
        }

        download.buf.extend_from_slice(&chunk.data);
        download.expected_index += 1;

        if new_len < download.size {
            return Ok(ChunkProgress::Pending {
                next_index: download.expected_index,
            });
        }
        self.finish(&chunk.uuid)
    }

    fn finish(&mut self, id: &str) -> Result<ChunkProgress> {
        let download = self.downloading.remove(id).ok_or_else(|| {
            ProtocolError::ResourcePackError(format!("{}: {id}", constants::ERR_PACK_NOT_CURRENT))
        })?;
        if self.current.as_ref().is_some_and(|current| current.id == id) {
            self.current = None;
        }

        let digest: [u8; 32] = Sha256::digest(&download.buf).into();
        if digest != download.checksum {
            return Err(ProtocolError::ChecksumMismatch(id.to_string()));
        }

        let content = Bytes::from(download.buf);
        let pack = Arc::new(ResourcePack {
            uuid: download.pack.uuid.clone(),
            version: download.pack.version.clone(),
            size: download.size,
            content: Some(content),
            checksum: Some(digest),
        });
        debug!(pack = %id, size = download.size, chunk_size = download.chunk_size, "Resource pack verified");
        self.downloaded.push(pack.clone());
        Ok(ChunkProgress::Complete(pack))
    }

    /// No pack is waiting and none is mid-transfer
    pub fn all_downloaded(&self) -> bool {
        self.requested.is_empty() && self.current.is_none() && self.downloading.is_empty()
    }
}
