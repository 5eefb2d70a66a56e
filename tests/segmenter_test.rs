use longform_server::error::LongformError;
use longform_server::segmenter::{estimate_seconds, plan_segments};

// Packing scenario: six ~5s sentences at a 12s target pack into three
// two-sentence segments.
#[test]
fn test_six_sentences_pack_into_three_segments() {
    let sentence = "This sentence has exactly twelve words to make five seconds even.";
    let script = vec![sentence; 6].join(" ");
    let segments = plan_segments(&script, 12, 15, "en-US").unwrap();

    assert_eq!(segments.len(), 3);
    for segment in &segments {
        // Two packed sentences estimate just under 10s
        assert!((8..=12).contains(&segment.duration_sec));
    }

    // Order preserved: concatenating the chunks reproduces the script
    let joined = segments
        .iter()
        .map(|s| s.text_chunk.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(joined, script);
}

// Oversize scenario: one ~40s sentence under a 12s cap gets split on its
// clause boundaries, every piece within the cap.
#[test]
fn test_long_sentence_split_on_clause_boundaries() {
    let clause = "the quick brown fox jumps over the lazy dog near here";
    let script = format!(
        "{}, {}, {}, {}, {}, {}, {}, {}, {}.",
        clause, clause, clause, clause, clause, clause, clause, clause, clause
    );
    assert!(estimate_seconds(&script, "en-US") > 35.0);

    let segments = plan_segments(&script, 12, 12, "en-US").unwrap();
    assert!(segments.len() >= 3);
    for segment in &segments {
        assert!(segment.duration_sec <= 12);
        assert!(estimate_seconds(&segment.text_chunk, "en-US") <= 12.5);
        assert!(!segment.text_chunk.trim().is_empty());
    }
}

#[test]
fn test_every_valid_script_yields_at_least_one_segment() {
    for script in [
        "Hi.",
        "One two three.",
        "Multiple sentences. In this. Script!",
        "No terminal punctuation at all",
        "नमस्ते। आप कैसे हैं।",
    ] {
        let segments = plan_segments(script, 10, 15, "en-US").unwrap();
        assert!(!segments.is_empty(), "script {:?} produced no segments", script);
        for segment in segments {
            assert!(!segment.text_chunk.trim().is_empty());
            assert!((1..=15).contains(&segment.duration_sec));
        }
    }
}

#[test]
fn test_whitespace_only_script_is_rejected() {
    let err = plan_segments(" \t\n ", 10, 15, "en-US").unwrap_err();
    assert!(matches!(err, LongformError::EmptyScript));
}

#[test]
fn test_giant_unbroken_token_overflows() {
    let blob: String = std::iter::repeat('x').take(5000).collect();
    let err = plan_segments(&blob, 10, 12, "en-US").unwrap_err();
    assert!(matches!(err, LongformError::ChunkOverflow { .. }));
}

#[test]
fn test_planning_is_deterministic() {
    let script = "Repeatable input text. With several sentences. To pack the same way every time.";
    let first = plan_segments(script, 8, 10, "en-US").unwrap();
    for _ in 0..5 {
        assert_eq!(plan_segments(script, 8, 10, "en-US").unwrap(), first);
    }
}
