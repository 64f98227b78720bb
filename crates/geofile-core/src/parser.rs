//! Streaming parser engine.
//!
//! The engine drives a byte source through a per-format automaton and turns
//! the resulting records into a lazy, rank-ordered stream of features,
//! without ever holding the whole source in memory.
//!
//! ## Pipeline
//!
//! ```text
//!  producer thread            decode workers             caller
//!  ───────────────            ──────────────             ──────
//!  read chunk ──► process(b)
//!                 emit(pos,bytes) ──[bounded jobs]──► decode(raw)
//!                                                       │
//!                                    [bounded results] ◄┘
//!                                          │
//!                                   reorder buffer ──► RecordStream::next()
//! ```
//!
//! - Ranks are assigned by the emitter, strictly in byte order.
//! - At most `max_pending` records are emitted but not yet yielded. `emit`
//!   takes a permit before handing a record to the workers and the stream
//!   returns it when that record is yielded, so a slow decode (or a slow
//!   caller) pauses byte delivery instead of growing the reorder buffer.
//! - Workers may finish out of order; the stream buffers completions and
//!   releases them by rank.
//! - The stream only reports completion once every emitted rank has been
//!   yielded, so a fully consumed stream is fully decoded.
//! - A syntax error aborts the whole parse. A decode error only affects its
//!   own record, which is yielded with `feature: None` and logged.

use crate::config::ParserConfig;
use crate::error::{GeofileError, Result, SyntaxError};
use crate::source::ByteSource;
use crate::types::{Feature, Handle, Rank, RawRecord};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// A per-format automaton consuming one byte at a time.
///
/// Automata keep their own state (row/field/quote for delimited text,
/// object/array/string depth for structured text) and call
/// [`Emitter::emit`] whenever a logical record is complete.
pub trait FormatParser: Send {
    /// Reset internal state and return the source to read.
    fn begin(&mut self) -> Arc<dyn ByteSource>;

    /// Consume one byte. `emitter.position()` is the offset of `byte`.
    fn process(&mut self, byte: u8, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError>;

    /// Flush any trailing record after the last byte.
    fn end(&mut self, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError>;
}

/// Turns one record's raw bytes into a feature.
pub trait RecordDecoder: Send + Sync {
    fn decode(&self, record: &RawRecord) -> Result<Feature>;
}

/// A pluggable data format: automaton factory plus decoder.
pub trait Format: Send + Sync {
    /// Short name (e.g. "csv")
    fn name(&self) -> &'static str;

    /// Create a fresh automaton reading `source`.
    fn parser(&self, source: Arc<dyn ByteSource>) -> Box<dyn FormatParser>;

    /// Create a decoder for records of `source`.
    ///
    /// Formats with a preamble (such as a header line) read it here.
    fn decoder(&self, source: &dyn ByteSource) -> Result<Arc<dyn RecordDecoder>>;
}

/// Receives completed records from an automaton and assigns ranks.
pub struct Emitter {
    position: u64,
    next_rank: Rank,
    emitted: Arc<AtomicU32>,
    jobs: Sender<RawRecord>,
    permits: Receiver<()>,
    closed: bool,
}

impl Emitter {
    fn new(jobs: Sender<RawRecord>, permits: Receiver<()>, emitted: Arc<AtomicU32>) -> Self {
        Emitter {
            position: 0,
            next_rank: 0,
            emitted,
            jobs,
            permits,
            closed: false,
        }
    }

    /// Offset of the byte currently being processed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Emit a completed record starting at `pos`.
    ///
    /// Blocks while `max_pending` records are emitted but not yet yielded
    /// by the stream.
    pub fn emit(&mut self, pos: u64, bytes: Vec<u8>) -> Rank {
        let rank = self.next_rank;
        self.next_rank += 1;
        let handle = Handle::new(rank, pos, bytes.len() as u32);
        trace!(rank, pos, len = handle.len, "Record emitted");

        if self.closed {
            return rank;
        }
        if self.permits.recv().is_err() || self.jobs.send(RawRecord::new(handle, bytes)).is_err() {
            // Consumer went away; the producer loop stops on the next byte.
            self.closed = true;
        } else {
            self.emitted.store(self.next_rank, Ordering::Release);
        }
        rank
    }

    /// Number of records emitted so far.
    pub fn count(&self) -> u32 {
        self.next_rank
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// One record of the stream, in rank order.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub handle: Handle,

    /// `None` when the decoder rejected this record
    pub feature: Option<Feature>,
}

enum Message {
    Record(ParsedRecord),
    Finished { count: u32 },
    Failed(GeofileError),
}

/// Runs one automaton over its source with a pool of decode workers.
pub struct ParserEngine {
    parser: Box<dyn FormatParser>,
    decoder: Arc<dyn RecordDecoder>,
    config: ParserConfig,
}

impl ParserEngine {
    pub fn new(
        parser: Box<dyn FormatParser>,
        decoder: Arc<dyn RecordDecoder>,
        config: ParserConfig,
    ) -> Self {
        ParserEngine {
            parser,
            decoder,
            config,
        }
    }

    /// Start the producer and worker threads and return the record stream.
    ///
    /// The stream is lazy and non-restartable: the source is processed
    /// once, front to back.
    pub fn run(self) -> Result<RecordStream> {
        let ParserEngine {
            mut parser,
            decoder,
            config,
        } = self;
        let capacity = config.max_pending.max(1);
        let (job_tx, job_rx) = bounded::<RawRecord>(capacity);
        let (done_tx, done_rx) = bounded::<Message>(capacity);
        let (permit_tx, permit_rx) = bounded::<()>(capacity);
        for _ in 0..capacity {
            permit_tx
                .send(())
                .map_err(|_| GeofileError::Internal("permit channel closed".to_string()))?;
        }
        let emitted = Arc::new(AtomicU32::new(0));

        let mut threads = Vec::with_capacity(config.workers + 1);
        for id in 0..config.workers.max(1) {
            let jobs = job_rx.clone();
            let results = done_tx.clone();
            let decoder = Arc::clone(&decoder);
            let handle = thread::Builder::new()
                .name(format!("geofile-decode-{}", id))
                .spawn(move || decode_worker(jobs, results, decoder))?;
            threads.push(handle);
        }
        drop(job_rx);

        let chunk_size = config.chunk_size.max(1);
        let producer_emitted = Arc::clone(&emitted);
        let handle = thread::Builder::new()
            .name("geofile-parse".to_string())
            .spawn(move || {
                let source = parser.begin();
                let mut emitter = Emitter::new(job_tx, permit_rx, producer_emitted);
                let outcome = feed(parser.as_mut(), source.as_ref(), &mut emitter, chunk_size);
                let count = emitter.count();
                // Closing the jobs channel lets workers drain and exit.
                drop(emitter);
                let message = match outcome {
                    Ok(()) => {
                        debug!(records = count, "Parse pass complete");
                        Message::Finished { count }
                    }
                    Err(e) => Message::Failed(e),
                };
                let _ = done_tx.send(message);
            })?;
        threads.push(handle);

        Ok(RecordStream {
            receiver: done_rx,
            permits: permit_tx,
            buffer: BTreeMap::new(),
            next_rank: 0,
            total: None,
            emitted,
            threads,
            done: false,
        })
    }
}

fn feed(
    parser: &mut dyn FormatParser,
    source: &dyn ByteSource,
    emitter: &mut Emitter,
    chunk_size: usize,
) -> Result<()> {
    let size = source.size();
    let mut offset = 0u64;
    let mut line = 1u64;
    let mut col = 1u64;

    while offset < size {
        let length = chunk_size.min((size - offset) as usize);
        let chunk = source.read(offset, length)?;
        for (i, &byte) in chunk.iter().enumerate() {
            emitter.position = offset + i as u64;
            parser
                .process(byte, emitter)
                .map_err(|e| GeofileError::Syntax(e.at(line, col)))?;
            if emitter.is_closed() {
                return Ok(());
            }
            if byte == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        offset += length as u64;
    }

    emitter.position = size;
    parser
        .end(emitter)
        .map_err(|e| GeofileError::Syntax(e.at(line, col)))
}

fn decode_worker(
    jobs: Receiver<RawRecord>,
    results: Sender<Message>,
    decoder: Arc<dyn RecordDecoder>,
) {
    for raw in jobs.iter() {
        let handle = raw.handle;
        let feature = match decoder.decode(&raw) {
            Ok(feature) => Some(feature),
            Err(e) => {
                warn!(rank = handle.rank, pos = handle.pos, error = %e, "Skipping undecodable record");
                None
            }
        };
        if results.send(Message::Record(ParsedRecord { handle, feature })).is_err() {
            break;
        }
    }
}

/// Rank-ordered stream of parsed records.
///
/// Yields `Err` at most once (the first syntax or I/O error) and then ends.
pub struct RecordStream {
    receiver: Receiver<Message>,
    permits: Sender<()>,
    buffer: BTreeMap<Rank, ParsedRecord>,
    next_rank: Rank,
    total: Option<u32>,
    emitted: Arc<AtomicU32>,
    threads: Vec<JoinHandle<()>>,
    done: bool,
}

impl RecordStream {
    /// Records emitted by the automaton but not yet yielded to the caller.
    pub fn pending(&self) -> u32 {
        self.emitted
            .load(Ordering::Acquire)
            .saturating_sub(self.next_rank)
    }

    /// Total record count, known once the producer reached the end.
    pub fn total(&self) -> Option<u32> {
        self.total
    }

    /// Only the successfully decoded features, still in rank order.
    pub fn features(self) -> impl Iterator<Item = Result<Feature>> {
        self.filter_map(|item| match item {
            Ok(record) => record.feature.map(Ok),
            Err(e) => Some(Err(e)),
        })
    }

    fn finish(&mut self) {
        self.done = true;
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Iterator for RecordStream {
    type Item = Result<ParsedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(record) = self.buffer.remove(&self.next_rank) {
                self.next_rank += 1;
                // Never blocks: at most `capacity` permits are out.
                let _ = self.permits.try_send(());
                return Some(Ok(record));
            }
            if let Some(total) = self.total {
                if self.next_rank >= total {
                    self.finish();
                    return None;
                }
            }
            match self.receiver.recv() {
                Ok(Message::Record(record)) => {
                    self.buffer.insert(record.handle.rank, record);
                }
                Ok(Message::Finished { count }) => {
                    self.total = Some(count);
                }
                Ok(Message::Failed(err)) => {
                    self.done = true;
                    self.buffer.clear();
                    return Some(Err(err));
                }
                Err(_) => {
                    self.done = true;
                    return Some(Err(GeofileError::Internal(format!(
                        "parser stopped after {} of {:?} records",
                        self.next_rank, self.total
                    ))));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::MemorySource;
    use geo_types::point;
    use serde_json::{Map, Value};
    use std::time::Duration;

    /// Newline-delimited test format: `x,y,name` per line, blank lines and
    /// lines starting with `#` get no rank, `!` is a syntax error.
    pub(crate) struct LineFormat;

    pub(crate) struct LineParser {
        source: Arc<dyn ByteSource>,
        start: u64,
        current: Vec<u8>,
    }

    impl FormatParser for LineParser {
        fn begin(&mut self) -> Arc<dyn ByteSource> {
            self.start = 0;
            self.current.clear();
            Arc::clone(&self.source)
        }

        fn process(&mut self, byte: u8, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
            match byte {
                b'!' => Err(SyntaxError::new("unexpected '!'")),
                b'\n' => {
                    self.flush(emitter);
                    self.start = emitter.position() + 1;
                    Ok(())
                }
                _ => {
                    self.current.push(byte);
                    Ok(())
                }
            }
        }

        fn end(&mut self, emitter: &mut Emitter) -> std::result::Result<(), SyntaxError> {
            self.flush(emitter);
            Ok(())
        }
    }

    impl LineParser {
        fn flush(&mut self, emitter: &mut Emitter) {
            let line = std::mem::take(&mut self.current);
            if !line.is_empty() && !line.starts_with(b"#") {
                emitter.emit(self.start, line);
            }
        }
    }

    pub(crate) struct LineDecoder;

    impl RecordDecoder for LineDecoder {
        fn decode(&self, record: &RawRecord) -> Result<Feature> {
            let text = record
                .text()
                .map_err(|e| GeofileError::decode(record.handle.rank, e.to_string()))?;
            let fields: Vec<&str> = text.split(',').collect();
            if fields.len() != 3 {
                return Err(GeofileError::decode(record.handle.rank, "expected 3 fields"));
            }
            let mut props = Map::new();
            props.insert("name".to_string(), Value::String(fields[2].to_string()));
            let geometry = match (fields[0].parse::<f64>(), fields[1].parse::<f64>()) {
                (Ok(x), Ok(y)) => Some(point!(x: x, y: y).into()),
                _ => None,
            };
            Ok(Feature::new(record.handle, geometry, props))
        }
    }

    impl Format for LineFormat {
        fn name(&self) -> &'static str {
            "lines"
        }

        fn parser(&self, source: Arc<dyn ByteSource>) -> Box<dyn FormatParser> {
            Box::new(LineParser {
                source,
                start: 0,
                current: Vec::new(),
            })
        }

        fn decoder(&self, _source: &dyn ByteSource) -> Result<Arc<dyn RecordDecoder>> {
            Ok(Arc::new(LineDecoder))
        }
    }

    /// Decoder that finishes records out of order.
    struct ShuffledDecoder;

    impl RecordDecoder for ShuffledDecoder {
        fn decode(&self, record: &RawRecord) -> Result<Feature> {
            let delay = (7 - (record.handle.rank % 7)) as u64;
            thread::sleep(Duration::from_millis(delay));
            LineDecoder.decode(record)
        }
    }

    /// Decoder that holds rank 0 back and records how far the others got
    /// in the meantime.
    #[derive(Default)]
    struct StalledDecoder {
        highest: AtomicU32,
        seen_while_stalled: AtomicU32,
    }

    impl RecordDecoder for StalledDecoder {
        fn decode(&self, record: &RawRecord) -> Result<Feature> {
            if record.handle.rank == 0 {
                thread::sleep(Duration::from_millis(200));
                let seen = self.highest.load(Ordering::Acquire);
                self.seen_while_stalled.store(seen, Ordering::Release);
            } else {
                self.highest.fetch_max(record.handle.rank, Ordering::AcqRel);
            }
            LineDecoder.decode(record)
        }
    }

    fn engine(text: &str, decoder: Arc<dyn RecordDecoder>, config: ParserConfig) -> ParserEngine {
        let source: Arc<dyn ByteSource> = Arc::new(MemorySource::from_text("test", text));
        ParserEngine::new(LineFormat.parser(source), decoder, config)
    }

    fn small_config() -> ParserConfig {
        ParserConfig {
            workers: 3,
            max_pending: 2,
            chunk_size: 5,
        }
    }

    #[test]
    fn test_ranks_are_dense_and_ordered() {
        let text = "-100,-100,Harry\n100,100,Mary\n100,-100,Liz\n";
        let records: Vec<ParsedRecord> = engine(text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.handle.rank, i as u32);
        }
        assert_eq!(records[1].handle, Handle::new(1, 16, 12));
        assert_eq!(
            records[1].feature.as_ref().unwrap().property_text("name").as_deref(),
            Some("Mary")
        );
    }

    #[test]
    fn test_skipped_lines_get_no_rank() {
        let text = "# comment\n\n1,1,a\n\n# another\n2,2,b\n\n";
        let records: Vec<ParsedRecord> = engine(text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].handle, Handle::new(0, 11, 5));
        assert_eq!(records[1].handle, Handle::new(1, 28, 5));
    }

    #[test]
    fn test_out_of_order_decodes_are_released_in_rank_order() {
        let text: String = (0..40).map(|i| format!("{},{},n{}\n", i, i, i)).collect();
        let config = ParserConfig {
            workers: 4,
            max_pending: 8,
            chunk_size: 64,
        };
        let ranks: Vec<Rank> = engine(&text, Arc::new(ShuffledDecoder), config)
            .run()
            .unwrap()
            .map(|r| r.unwrap().handle.rank)
            .collect();

        assert_eq!(ranks, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_slow_record_bounds_pending_work() {
        let text: String = (0..2000).map(|i| format!("{},{},n{}\n", i, i, i)).collect();
        let config = ParserConfig {
            workers: 2,
            max_pending: 2,
            chunk_size: 64,
        };
        let decoder = Arc::new(StalledDecoder::default());
        let mut stream = engine(&text, Arc::clone(&decoder) as Arc<dyn RecordDecoder>, config)
            .run()
            .unwrap();

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.handle.rank, 0);
        // Only rank 1 can be emitted while rank 0 is still decoding.
        assert!(decoder.seen_while_stalled.load(Ordering::Acquire) < 2);
        assert!(stream.pending() <= 2);
        assert!(stream.buffer.len() <= 2);

        let mut count = 1;
        while let Some(record) = stream.next() {
            assert_eq!(record.unwrap().handle.rank, count);
            assert!(stream.pending() <= 2);
            assert!(stream.buffer.len() <= 2);
            count += 1;
        }
        assert_eq!(count, 2000);
    }

    #[test]
    fn test_decode_error_skips_only_that_record() {
        let text = "1,1,a\nbroken\n3,3,c\n";
        let records: Vec<ParsedRecord> = engine(text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert!(records[0].feature.is_some());
        assert!(records[1].feature.is_none());
        assert!(records[2].feature.is_some());
    }

    #[test]
    fn test_syntax_error_aborts_with_position() {
        let text = "1,1,a\n2,2,b\n3,!,c\n4,4,d\n";
        let mut stream = engine(text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap();

        let err = stream
            .by_ref()
            .find_map(|item| item.err())
            .expect("syntax error expected");
        match err {
            GeofileError::Syntax(e) => {
                assert_eq!(e.line, 3);
                assert_eq!(e.col, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_features_adapter() {
        let text = "1,1,a\nbroken\n3,3,c";
        let names: Vec<String> = engine(text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap()
            .features()
            .map(|f| f.unwrap().property_text("name").unwrap())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_stream_reports_total_after_drain() {
        let mut stream = engine("1,1,a\n2,2,b\n", Arc::new(LineDecoder), small_config())
            .run()
            .unwrap();
        assert_eq!(stream.by_ref().count(), 2);
        assert_eq!(stream.total(), Some(2));
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_dropping_stream_early_stops_threads() {
        let text: String = (0..500).map(|i| format!("{},{},n{}\n", i, i, i)).collect();
        let mut stream = engine(&text, Arc::new(LineDecoder), small_config())
            .run()
            .unwrap();
        assert!(stream.next().is_some());
        drop(stream);
    }

    #[test]
    fn test_empty_source() {
        let records: Vec<_> = engine("", Arc::new(LineDecoder), small_config())
            .run()
            .unwrap()
            .collect();
        assert!(records.is_empty());
    }
}
