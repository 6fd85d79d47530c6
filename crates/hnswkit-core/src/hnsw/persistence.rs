//! Binary snapshot codec.
//!
//! # Layout
//!
//! All integers little-endian, fixed width:
//!
//! ```text
//! magic            [u8; 4] = "HNSW"
//! version          u32     = 1
//! dimension        u32
//! metric           u8      (0 = l2, 1 = ip, 2 = cosine)
//! max_connections  u32
//! ef_construction  u32
//! capacity         u64
//! count            u64     allocated slots
//! entry_point      u64     u64::MAX when empty
//! slot_reuse       u8
//! count x slot record:
//!   label          u64
//!   tombstone      u8
//!   top_layer      u32
//!   vector         dimension x f32
//!   (top_layer + 1) x { n: u32, n x neighbor: u32 }
//! ```

use super::graph::HnswGraph;
use super::params::HnswParams;
use super::store::{EntryPoint, GraphStore, Links, Slot, SlotArena};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

const MAGIC: &[u8; 4] = b"HNSW";
const VERSION: u32 = 1;
const NO_ENTRY: u64 = u64::MAX;

/// magic + version + dimension + metric + M + efc + capacity + count + entry + reuse
const HEADER_LEN: usize = 4 + 4 + 4 + 1 + 4 + 4 + 8 + 8 + 8 + 1;

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Internal(format!("{what} {value} does not fit in u32")))
}

impl HnswGraph {
    /// Exact length of the snapshot [`HnswGraph::to_bytes`] would produce now.
    pub(crate) fn serialized_size(&self) -> usize {
        let arena = self.store.arena.write();
        let record_fixed = 8 + 1 + 4 + 4 * self.store.dimension;

        HEADER_LEN
            + arena
                .allocated_slots()
                .iter()
                .map(|slot| {
                    let links = slot.links.read();
                    record_fixed
                        + (0..=slot.level())
                            .map(|layer| 4 + 4 * links.get(layer).map_or(0, Vec::len))
                            .sum::<usize>()
                })
                .sum::<usize>()
    }

    /// Encodes the whole graph. Holds the arena exclusively while encoding.
    pub(crate) fn to_bytes(&self) -> Result<Bytes> {
        let arena = self.store.arena.write();
        self.encode(&arena).map(BytesMut::freeze)
    }

    fn encode(&self, arena: &SlotArena) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);

        buf.put_slice(MAGIC);
        buf.put_u32_le(VERSION);
        buf.put_u32_le(to_u32(self.store.dimension, "dimension")?);
        buf.put_u8(self.store.metric.id());
        buf.put_u32_le(to_u32(self.params.max_connections, "max_connections")?);
        buf.put_u32_le(to_u32(self.params.ef_construction, "ef_construction")?);
        buf.put_u64_le(arena.capacity() as u64);
        buf.put_u64_le(arena.allocated() as u64);
        buf.put_u64_le(
            self.store
                .entry_point()
                .map_or(NO_ENTRY, |ep| ep.slot as u64),
        );
        buf.put_u8(u8::from(self.params.allow_replace_deleted));

        for slot in arena.allocated_slots() {
            let top_layer = slot.level();
            buf.put_u64_le(slot.label());
            buf.put_u8(u8::from(slot.is_deleted()));
            buf.put_u32_le(to_u32(top_layer, "top_layer")?);
            for &value in slot.vector().iter() {
                buf.put_f32_le(value);
            }

            let links = slot.links.read();
            for layer in 0..=top_layer {
                let neighbors = links.get(layer).map_or(&[][..], Vec::as_slice);
                buf.put_u32_le(to_u32(neighbors.len(), "neighbor count")?);
                for &neighbor in neighbors {
                    buf.put_u32_le(to_u32(neighbor, "neighbor")?);
                }
            }
        }

        Ok(buf)
    }

    /// Writes a snapshot to `path`, returning its size in bytes.
    pub(crate) fn save(&self, path: &Path) -> Result<u64> {
        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;

        info!(path = %path.display(), bytes = bytes.len(), "saved index");
        Ok(bytes.len() as u64)
    }

    /// Reads a snapshot from `path`.
    pub(crate) fn load(
        path: &Path,
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
    ) -> Result<Self> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        let graph = Self::from_bytes(&data, dimension, metric, params)?;
        info!(
            path = %path.display(),
            bytes = data.len(),
            count = graph.current_count(),
            "loaded index"
        );
        Ok(graph)
    }

    /// Decodes a snapshot for an index of the given shape.
    ///
    /// Structure (M, `ef_construction`) comes from the snapshot; seed, slot
    /// reuse and alpha come from `params`. Capacity is the larger of
    /// `params.max_elements` and the stored slot count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] for corrupt data or a dimension/metric that
    /// does not match the caller's.
    pub(crate) fn from_bytes(
        data: &[u8],
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
    ) -> Result<Self> {
        let mut reader = Reader::new(data);

        let magic = reader.take(4, "magic")?;
        if magic != MAGIC {
            return Err(Error::Format(format!("bad magic {magic:02x?}")));
        }
        let version = reader.u32("version")?;
        if version != VERSION {
            return Err(Error::Format(format!("unsupported version {version}")));
        }

        let stored_dimension = reader.u32("dimension")? as usize;
        if stored_dimension != dimension {
            return Err(Error::Format(format!(
                "snapshot dimension {stored_dimension} does not match {dimension}"
            )));
        }
        let metric_id = reader.u8("metric")?;
        let stored_metric = DistanceMetric::from_id(metric_id)
            .ok_or_else(|| Error::Format(format!("unknown metric id {metric_id}")))?;
        if stored_metric != metric {
            return Err(Error::Format(format!(
                "snapshot metric {stored_metric} does not match {metric}"
            )));
        }

        let max_connections = reader.u32("max_connections")? as usize;
        let ef_construction = reader.u32("ef_construction")? as usize;
        let stored_capacity = reader.u64("capacity")?;
        let count = reader.u64("count")?;
        let entry = reader.u64("entry_point")?;
        let stored_reuse = reader.u8("slot_reuse")?;

        if count > u64::from(u32::MAX) {
            return Err(Error::Format(format!("slot count {count} exceeds u32 range")));
        }
        if count > stored_capacity {
            return Err(Error::Format(format!(
                "slot count {count} exceeds stored capacity {stored_capacity}"
            )));
        }
        if stored_reuse > 1 {
            return Err(Error::Format(format!("invalid slot_reuse flag {stored_reuse}")));
        }
        #[allow(clippy::cast_possible_truncation)]
        let count = count as usize;

        let capacity = params.max_elements.max(count);
        if capacity > params.max_elements {
            warn!(
                requested = params.max_elements,
                stored = count,
                "capacity raised to the stored slot count"
            );
        }
        let params = HnswParams {
            max_connections,
            ef_construction,
            max_elements: capacity,
            ..params
        };
        params
            .validate()
            .map_err(|e| Error::Format(format!("invalid stored parameters: {e}")))?;

        // Smallest possible record: one empty layer
        let min_record = 8 + 1 + 4 + 4 * dimension + 4;
        let mut slots = Vec::with_capacity(count.min(reader.remaining() / min_record));
        let mut seen = FxHashSet::default();
        let mut max_level = 0;

        for index in 0..count {
            let label = reader.u64("label")?;
            if !seen.insert(label) {
                return Err(Error::Format(format!(
                    "duplicate label {label} at slot {index}"
                )));
            }
            let deleted = match reader.u8("tombstone")? {
                0 => false,
                1 => true,
                other => {
                    return Err(Error::Format(format!(
                        "invalid tombstone flag {other} at slot {index}"
                    )))
                }
            };
            let top_layer = reader.u32("top_layer")? as usize;

            reader.need(4 * dimension, "vector")?;
            let vector: Vec<f32> = (0..dimension).map(|_| reader.buf.get_f32_le()).collect();

            let mut links = Links::new();
            for _ in 0..=top_layer {
                let n = reader.u32("neighbor count")? as usize;
                reader.need(4 * n, "neighbors")?;
                let mut neighbors = Vec::with_capacity(n);
                for _ in 0..n {
                    let neighbor = reader.buf.get_u32_le() as usize;
                    if neighbor >= count {
                        return Err(Error::Format(format!(
                            "slot {index} links to {neighbor}, beyond {count} slots"
                        )));
                    }
                    neighbors.push(neighbor);
                }
                links.push(neighbors);
            }

            max_level = max_level.max(top_layer);
            slots.push(Slot::restored(vector, label, links, deleted));
        }

        if reader.remaining() > 0 {
            return Err(Error::Format(format!(
                "{} trailing bytes after the last slot",
                reader.remaining()
            )));
        }

        let entry = if entry == NO_ENTRY {
            if count > 0 {
                return Err(Error::Format("missing entry point".to_string()));
            }
            None
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let slot = entry as usize;
            if entry >= count as u64 {
                return Err(Error::Format(format!(
                    "entry point {entry} out of range for {count} slots"
                )));
            }
            let level = slots[slot].level();
            if level != max_level {
                return Err(Error::Format(format!(
                    "entry point {slot} is on layer {level}, highest layer is {max_level}"
                )));
            }
            Some(EntryPoint { slot, level })
        };

        let arena = SlotArena::from_slots(slots, capacity);
        let store = GraphStore::restore(
            dimension,
            metric,
            arena,
            entry,
            params.allow_replace_deleted,
        );
        Ok(Self::from_store(store, params))
    }
}

/// Bounds-checked cursor over a snapshot.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, len: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(Error::Format(format!(
                "truncated {what}: need {len} bytes, {} left",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        self.need(len, what)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64_le())
    }
}
