pub mod aggregate;
pub mod checks;
pub mod config;
pub mod domain;
pub mod error;
pub mod fasta;
pub mod fs_util;
pub mod homology;
pub mod report;
pub mod scoring;
pub mod search;
pub mod seqtype;
pub mod store;
pub mod validation;
