//! Wake phrase detection on transcribed text
//!
//! Detection is plain substring containment on lower-cased transcripts;
//! there is no acoustic model involved.

mod matcher;

pub use matcher::{matches, WakePhrase, WakePhraseError};
