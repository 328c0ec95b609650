use std::fs;

use assert_matches::assert_matches;

use gene_validator::domain::SequenceKind;
use gene_validator::error::GvError;
use gene_validator::fasta::{FastaIndex, RawSequenceIndex, parse_prediction};
use gene_validator::seqtype::kind_of_records;

const PROTEINS: &str = ">q1 first protein\nMKVLLAGHWPQRST\nEDCFIY\n>q2\nMSTNPKPQRKTKRN\n";

#[test]
fn records_are_read_back_by_position() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("in.fa");
    fs::write(&path, PROTEINS).unwrap();

    let index = FastaIndex::from_path(&path).unwrap();
    assert_eq!(index.len(), 2);

    let second = index.read_record(&path, 1).unwrap();
    assert_eq!(second, ">q2\nMSTNPKPQRKTKRN\n");

    let first = parse_prediction(&index.read_record(&path, 0).unwrap(), SequenceKind::Protein)
        .unwrap();
    assert_eq!(first.identifier, "q1");
    assert_eq!(first.definition, "q1 first protein");
    assert_eq!(first.length, 20);
    assert_eq!(first.raw_sequence.as_deref(), Some("MKVLLAGHWPQRSTEDCFIY"));
}

#[test]
fn nucleotide_length_is_counted_in_codons() {
    let record = ">g1\nATGAAAGTTCTTCTTGCTTAA\n";
    let prediction = parse_prediction(record, SequenceKind::Nucleotide).unwrap();
    assert_eq!(prediction.length, 7);
}

#[test]
fn marker_inside_a_line_is_not_a_record() {
    let index = FastaIndex::build(b">a\nMKV>LLA\n>b\nMKV\n").unwrap();
    assert_eq!(index.len(), 2);
}

#[test]
fn missing_input_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let err = FastaIndex::from_path(&temp.path().join("absent.fa")).unwrap_err();
    assert_matches!(err, GvError::FileNotFound(_));
}

#[test]
fn mixed_sequence_types_are_rejected() {
    let fasta = ">n\nACGTACGTACGTACGTACGT\n>p\nMKVLLAGHWPQRSTEDCFIY\n";
    assert_matches!(kind_of_records(fasta), Err(GvError::SequenceType(_)));
    assert_eq!(
        kind_of_records(PROTEINS).unwrap(),
        Some(SequenceKind::Protein)
    );
}

#[test]
fn raw_sequence_index_is_persisted_and_reloaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("raw.fa");
    fs::write(&path, ">XP_1.1 some hit [Homo sapiens]\nMKVLL\nAGHW\n>XP_2.1\nMSTNP\n").unwrap();

    let built = RawSequenceIndex::build(&path).unwrap();
    assert_eq!(built.len(), 2);
    assert!(RawSequenceIndex::index_path(&path).is_file());
    assert!(fs::read_to_string(&path).unwrap().starts_with(">XP_1.1\n"));

    let loaded = RawSequenceIndex::load(&path).unwrap();
    assert_eq!(loaded.sequence("XP_1.1").unwrap().as_deref(), Some("MKVLLAGHW"));
    assert_eq!(loaded.sequence("XP_2.1").unwrap().as_deref(), Some("MSTNP"));
    assert_eq!(loaded.sequence("XP_3.1").unwrap(), None);
}
