use std::io::Cursor;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::name::QName;

use crate::domain::{SequenceKind, SequenceRecord};
use crate::error::GvError;
use crate::homology::{RawHsp, ResultSource, finish_hsp, open_results, parse_field};

/// Yields the hits of one `<Iteration>` (one query) at a time.
pub struct StructuredReader {
    reader: Reader<ResultSource>,
    kind: SequenceKind,
    buf: Vec<u8>,
}

#[derive(Default)]
struct RawHit {
    id: String,
    def: String,
    accession: String,
    len: u64,
    hsps: Vec<crate::domain::HspRecord>,
}

impl StructuredReader {
    pub fn open(path: &Path, kind: SequenceKind) -> Result<Self, GvError> {
        Ok(Self::from_source(open_results(path)?, kind))
    }

    /// Reader over an in-memory XML document, e.g. the output of a live search.
    pub fn from_xml(xml: String, kind: SequenceKind) -> Self {
        Self::from_source(Box::new(Cursor::new(xml.into_bytes())), kind)
    }

    pub fn from_source(source: ResultSource, kind: SequenceKind) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            kind,
            buf: Vec::new(),
        }
    }

    /// Moves the cursor onto the next `<Iteration>` start tag.
    fn seek_iteration(&mut self) -> Result<bool, GvError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf).map_err(xml_error)? {
                Event::Start(tag) if tag.name().as_ref() == b"Iteration" => return Ok(true),
                Event::Eof => return Ok(false),
                _ => {}
            }
        }
    }

    /// Hits of the next query, or `None` at the end of the stream.
    pub fn next_query(&mut self) -> Result<Option<Vec<SequenceRecord>>, GvError> {
        if !self.seek_iteration()? {
            return Ok(None);
        }

        let mut hits = Vec::new();
        let mut hit: Option<RawHit> = None;
        let mut hsp: Option<RawHsp> = None;
        let mut text = String::new();

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf).map_err(xml_error)? {
                Event::Start(tag) => {
                    match tag.name().as_ref() {
                        b"Hit" => hit = Some(RawHit::default()),
                        b"Hsp" => hsp = Some(RawHsp::default()),
                        _ => {}
                    }
                    text.clear();
                }
                Event::Text(content) => {
                    text.push_str(&content.unescape().map_err(xml_error)?);
                }
                Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content)),
                Event::End(tag) => {
                    let name = tag.name();
                    match name.as_ref() {
                        b"Iteration" => return Ok(Some(hits)),
                        b"Hsp" => {
                            let raw = hsp.take().ok_or_else(|| unbalanced("Hsp"))?;
                            let record = finish_hsp(raw, self.kind)?;
                            hit.as_mut().ok_or_else(|| unbalanced("Hit"))?.hsps.push(record);
                        }
                        b"Hit" => {
                            let raw = hit.take().ok_or_else(|| unbalanced("Hit"))?;
                            hits.push(finish_hit(raw));
                        }
                        field => {
                            if let Some(current) = hsp.as_mut() {
                                assign_hsp_field(current, field, &text)?;
                            } else if let Some(current) = hit.as_mut() {
                                assign_hit_field(current, field, &text)?;
                            }
                        }
                    }
                    text.clear();
                }
                Event::Eof => {
                    return Err(GvError::Format(
                        "BLAST XML ends inside an <Iteration>".to_string(),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Consumes one `<Iteration>` without building hits.
    pub fn skip_query(&mut self) -> Result<bool, GvError> {
        if !self.seek_iteration()? {
            return Ok(false);
        }
        self.buf.clear();
        self.reader
            .read_to_end_into(QName(b"Iteration"), &mut self.buf)
            .map_err(xml_error)?;
        Ok(true)
    }
}

fn finish_hit(raw: RawHit) -> SequenceRecord {
    let accession = if raw.accession.is_empty() {
        raw.id.clone()
    } else {
        raw.accession
    };
    SequenceRecord {
        identifier: raw.id,
        accession,
        definition: raw.def,
        kind: SequenceKind::Protein,
        length: raw.len,
        raw_sequence: None,
        hsps: raw.hsps,
    }
}

fn assign_hit_field(hit: &mut RawHit, field: &[u8], value: &str) -> Result<(), GvError> {
    match field {
        b"Hit_id" => hit.id = value.to_string(),
        b"Hit_def" => hit.def = value.to_string(),
        b"Hit_accession" => hit.accession = value.to_string(),
        b"Hit_len" => hit.len = parse_field("Hit_len", value)?,
        _ => {}
    }
    Ok(())
}

fn assign_hsp_field(hsp: &mut RawHsp, field: &[u8], value: &str) -> Result<(), GvError> {
    match field {
        b"Hsp_evalue" => hsp.evalue = parse_field("Hsp_evalue", value)?,
        b"Hsp_hit-from" => hsp.hit_from = parse_field("Hsp_hit-from", value)?,
        b"Hsp_hit-to" => hsp.hit_to = parse_field("Hsp_hit-to", value)?,
        b"Hsp_query-from" => hsp.query_from = parse_field("Hsp_query-from", value)?,
        b"Hsp_query-to" => hsp.query_to = parse_field("Hsp_query-to", value)?,
        b"Hsp_query-frame" => hsp.query_frame = parse_field("Hsp_query-frame", value)?,
        b"Hsp_identity" => hsp.identity = parse_field("Hsp_identity", value)?,
        b"Hsp_align-len" => hsp.align_len = parse_field("Hsp_align-len", value)?,
        b"Hsp_qseq" => hsp.query_alignment = value.to_string(),
        b"Hsp_hseq" => hsp.hit_alignment = value.to_string(),
        _ => {}
    }
    Ok(())
}

fn xml_error(err: impl std::fmt::Display) -> GvError {
    GvError::Format(format!("malformed BLAST XML: {err}"))
}

fn unbalanced(tag: &str) -> GvError {
    GvError::Format(format!("unbalanced <{tag}> element in BLAST XML"))
}
