use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::FtsError;

/// 4-byte magic prefix every segment file starts with.
pub const MAGIC: [u8; 4] = *b"CFLX";
/// On-disk format version; bumped on any layout change.
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 48;
const TERM_ENTRY_LEN: usize = 24;

/// Per-document metadata kept in the segment's doc table.
#[derive(Debug, Clone)]
pub struct DocEntry {
    pub id: String,
    pub url: String,
    /// Token count after tokenization; the BM25 `dl` term.
    pub token_len: u32,
}

/// A decoded posting list: `(doc_id, term_frequency)` pairs, doc ids
/// strictly increasing.
#[derive(Debug, Clone)]
pub struct Postings {
    pub doc_freq: u32,
    pub entries: Vec<(u32, u32)>,
}

// ---------------------------------------------------------------------------
// Varint (LEB128) encoding for posting streams
// ---------------------------------------------------------------------------

pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub fn read_varint(buf: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serialize one immutable segment.
///
/// `docs[i]` describes internal doc id `i`; `postings` maps term hash to its
/// `(doc_id, tf)` list. The map's sort order gives the dictionary its
/// monotonically non-decreasing hash invariant for free.
pub struct SegmentWriter;

impl SegmentWriter {
    pub fn write(
        path: &Path,
        docs: &[DocEntry],
        postings: &BTreeMap<u64, Vec<(u32, u32)>>,
    ) -> Result<(), FtsError> {
        let mut doc_table = Vec::new();
        let mut total_tokens: u64 = 0;
        for doc in docs {
            let id = doc.id.as_bytes();
            let url = doc.url.as_bytes();
            doc_table.extend_from_slice(&(id.len() as u16).to_le_bytes());
            doc_table.extend_from_slice(id);
            doc_table.extend_from_slice(&(url.len() as u16).to_le_bytes());
            doc_table.extend_from_slice(url);
            doc_table.extend_from_slice(&doc.token_len.to_le_bytes());
            total_tokens += u64::from(doc.token_len);
        }

        let mut term_dict = Vec::with_capacity(postings.len() * TERM_ENTRY_LEN);
        let mut posting_bytes = Vec::new();
        for (hash, entries) in postings {
            let start = posting_bytes.len() as u64;
            let mut prev_doc = 0u32;
            for (i, (doc_id, tf)) in entries.iter().enumerate() {
                let gap = if i == 0 { *doc_id } else { doc_id - prev_doc };
                write_varint(&mut posting_bytes, u64::from(gap));
                write_varint(&mut posting_bytes, u64::from(*tf));
                prev_doc = *doc_id;
            }
            let byte_len = posting_bytes.len() as u64 - start;
            term_dict.extend_from_slice(&hash.to_le_bytes());
            term_dict.extend_from_slice(&start.to_le_bytes());
            term_dict.extend_from_slice(&(entries.len() as u32).to_le_bytes());
            term_dict.extend_from_slice(&(byte_len as u32).to_le_bytes());
        }

        let doc_table_offset = HEADER_LEN as u64;
        let term_dict_offset = doc_table_offset + doc_table.len() as u64;
        let postings_offset = term_dict_offset + term_dict.len() as u64;

        let mut out = Vec::with_capacity(
            HEADER_LEN + doc_table.len() + term_dict.len() + posting_bytes.len(),
        );
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(docs.len() as u32).to_le_bytes());
        out.extend_from_slice(&(postings.len() as u32).to_le_bytes());
        out.extend_from_slice(&total_tokens.to_le_bytes());
        out.extend_from_slice(&doc_table_offset.to_le_bytes());
        out.extend_from_slice(&term_dict_offset.to_le_bytes());
        out.extend_from_slice(&postings_offset.to_le_bytes());
        out.extend_from_slice(&doc_table);
        out.extend_from_slice(&term_dict);
        out.extend_from_slice(&posting_bytes);

        let tmp = path.with_extension("seg.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&out)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A memory-mapped, immutable segment.
pub struct SegmentReader {
    mmap: Mmap,
    docs: Vec<DocEntry>,
    term_count: usize,
    total_tokens: u64,
    term_dict_offset: usize,
    postings_offset: usize,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self, FtsError> {
        let corrupt = |reason: &str| FtsError::Corrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let file = File::open(path)?;
        // Segments are immutable once renamed into place.
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < HEADER_LEN {
            return Err(corrupt("truncated header"));
        }
        if mmap[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_le_bytes(mmap[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {}", version)));
        }

        let doc_count = u32::from_le_bytes(mmap[8..12].try_into().unwrap()) as usize;
        let term_count = u32::from_le_bytes(mmap[12..16].try_into().unwrap()) as usize;
        let total_tokens = u64::from_le_bytes(mmap[16..24].try_into().unwrap());
        let doc_table_offset = u64::from_le_bytes(mmap[24..32].try_into().unwrap()) as usize;
        let term_dict_offset = u64::from_le_bytes(mmap[32..40].try_into().unwrap()) as usize;
        let postings_offset = u64::from_le_bytes(mmap[40..48].try_into().unwrap()) as usize;

        if term_dict_offset
            .checked_add(term_count * TERM_ENTRY_LEN)
            .is_none_or(|end| end > mmap.len() || end > postings_offset)
            || postings_offset > mmap.len()
        {
            return Err(corrupt("offsets out of bounds"));
        }

        // Parse the doc table eagerly; it is small next to the postings.
        let mut docs = Vec::with_capacity(doc_count);
        let mut pos = doc_table_offset;
        for _ in 0..doc_count {
            let id = read_prefixed_str(&mmap, &mut pos).ok_or_else(|| corrupt("doc table id"))?;
            let url = read_prefixed_str(&mmap, &mut pos).ok_or_else(|| corrupt("doc table url"))?;
            if pos + 4 > mmap.len() {
                return Err(corrupt("doc table length"));
            }
            let token_len = u32::from_le_bytes(mmap[pos..pos + 4].try_into().unwrap());
            pos += 4;
            docs.push(DocEntry { id, url, token_len });
        }
        if pos > term_dict_offset {
            return Err(corrupt("doc table overruns term dictionary"));
        }

        let reader = Self {
            mmap,
            docs,
            term_count,
            total_tokens,
            term_dict_offset,
            postings_offset,
        };

        // Dictionary hashes must be monotonically non-decreasing.
        let mut prev = 0u64;
        for i in 0..reader.term_count {
            let hash = reader.term_entry(i).0;
            if hash < prev {
                return Err(corrupt("term dictionary not sorted"));
            }
            prev = hash;
        }

        Ok(reader)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn doc(&self, doc_id: u32) -> Option<&DocEntry> {
        self.docs.get(doc_id as usize)
    }

    fn term_entry(&self, index: usize) -> (u64, u64, u32, u32) {
        let base = self.term_dict_offset + index * TERM_ENTRY_LEN;
        let hash = u64::from_le_bytes(self.mmap[base..base + 8].try_into().unwrap());
        let offset = u64::from_le_bytes(self.mmap[base + 8..base + 16].try_into().unwrap());
        let doc_freq = u32::from_le_bytes(self.mmap[base + 16..base + 20].try_into().unwrap());
        let byte_len = u32::from_le_bytes(self.mmap[base + 20..base + 24].try_into().unwrap());
        (hash, offset, doc_freq, byte_len)
    }

    /// Binary-search the dictionary and decode the posting list.
    pub fn lookup(&self, term_hash: u64) -> Option<Postings> {
        let mut lo = 0usize;
        let mut hi = self.term_count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (hash, ..) = self.term_entry(mid);
            match hash.cmp(&term_hash) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    let (_, offset, doc_freq, byte_len) = self.term_entry(mid);
                    return self.decode_postings(offset, doc_freq, byte_len);
                }
            }
        }
        None
    }

    fn decode_postings(&self, offset: u64, doc_freq: u32, byte_len: u32) -> Option<Postings> {
        let start = self.postings_offset + offset as usize;
        let end = start + byte_len as usize;
        let slice = self.mmap.get(start..end)?;

        let mut entries = Vec::with_capacity(doc_freq as usize);
        let mut pos = 0usize;
        let mut doc_id = 0u32;
        for i in 0..doc_freq {
            let gap = read_varint(slice, &mut pos)? as u32;
            let tf = read_varint(slice, &mut pos)? as u32;
            doc_id = if i == 0 { gap } else { doc_id + gap };
            entries.push((doc_id, tf));
        }
        Some(Postings { doc_freq, entries })
    }
}

fn read_prefixed_str(buf: &[u8], pos: &mut usize) -> Option<String> {
    if *pos + 2 > buf.len() {
        return None;
    }
    let len = u16::from_le_bytes(buf[*pos..*pos + 2].try_into().unwrap()) as usize;
    *pos += 2;
    let bytes = buf.get(*pos..*pos + len)?;
    *pos += len;
    String::from_utf8(bytes.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        let mut buf = Vec::new();
        for v in [0u64, 1, 127, 128, 300, 16_383, 16_384, u64::MAX] {
            buf.clear();
            write_varint(&mut buf, v);
            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos), Some(v));
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn segment_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg-0.seg");

        let docs = vec![
            DocEntry {
                id: "doc-a".into(),
                url: "https://example.org/a".into(),
                token_len: 10,
            },
            DocEntry {
                id: "doc-b".into(),
                url: "https://example.org/b".into(),
                token_len: 30,
            },
        ];
        let mut postings = BTreeMap::new();
        postings.insert(42u64, vec![(0u32, 3u32), (1, 1)]);
        postings.insert(99u64, vec![(1u32, 7u32)]);

        SegmentWriter::write(&path, &docs, &postings).unwrap();
        let reader = SegmentReader::open(&path).unwrap();

        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.total_tokens(), 40);
        assert_eq!(reader.doc(1).unwrap().id, "doc-b");

        let p = reader.lookup(42).unwrap();
        assert_eq!(p.doc_freq, 2);
        assert_eq!(p.entries, vec![(0, 3), (1, 1)]);
        assert!(reader.lookup(7).is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.seg");
        std::fs::write(&path, b"NOPE00000000000000000000000000000000000000000000").unwrap();
        assert!(matches!(
            SegmentReader::open(&path),
            Err(FtsError::Corrupt { .. })
        ));
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.seg");
        std::fs::write(&path, b"CFLX").unwrap();
        assert!(matches!(
            SegmentReader::open(&path),
            Err(FtsError::Corrupt { .. })
        ));
    }
}
