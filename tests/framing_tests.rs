use marlinx::kernel::LineFramer;

const CAP: usize = 20 << 20;

#[test]
fn test_two_messages_in_one_chunk() {
    let mut framer = LineFramer::new(CAP);
    let lines = framer.push("{\"id\":1}\n{\"id\":2}\n");
    assert_eq!(lines, vec!["{\"id\":1}", "{\"id\":2}"]);
    assert_eq!(framer.buffered(), 0);
}

#[test]
fn test_chunk_boundary_independence() {
    let payload =
        "{\"method\":\"price.update\",\"params\":[\"BTC/USD\",\"8000\"]}\n{\"id\":7,\"result\":null}\n";

    let mut reference = LineFramer::new(CAP);
    let expected = reference.push(payload);
    assert_eq!(expected.len(), 2);

    // Splitting the same bytes at every offset must yield the same messages.
    for split in 1..payload.len() {
        let mut framer = LineFramer::new(CAP);
        let mut lines = framer.push(&payload[..split]);
        lines.extend(framer.push(&payload[split..]));
        assert_eq!(lines, expected, "split at byte {}", split);
    }
}

#[test]
fn test_trailing_partial_kept_across_reads() {
    let mut framer = LineFramer::new(CAP);
    assert!(framer.push("{\"id\":1,\"res").is_empty());
    assert!(framer.push("ult\":\"ok\"").is_empty());
    let lines = framer.push("}\n{\"id\":2");
    assert_eq!(lines, vec!["{\"id\":1,\"result\":\"ok\"}"]);
    assert_eq!(framer.buffered(), "{\"id\":2".len());
}

#[test]
fn test_empty_lines_skipped() {
    let mut framer = LineFramer::new(CAP);
    let lines = framer.push("{\"id\":1}\n\n\n{\"id\":2}\n\n");
    assert_eq!(lines, vec!["{\"id\":1}", "{\"id\":2}"]);
}

#[test]
fn test_overflow_clears_buffer_then_recovers() {
    let limit = 64;
    let mut framer = LineFramer::new(limit);

    let oversized = "x".repeat(limit + 1);
    assert!(framer.push(&oversized).is_empty());
    assert_eq!(framer.buffered(), 0);

    // A well-formed message after the reset parses normally.
    let lines = framer.push("{\"id\":3,\"result\":true}\n");
    assert_eq!(lines, vec!["{\"id\":3,\"result\":true}"]);
}

#[test]
fn test_overflow_in_increments() {
    let limit = 32;
    let mut framer = LineFramer::new(limit);

    for _ in 0..9 {
        framer.push("xxxx");
    }
    // The 9th chunk pushed the buffer past the cap and reset it whole.
    assert_eq!(framer.buffered(), 0);
}
