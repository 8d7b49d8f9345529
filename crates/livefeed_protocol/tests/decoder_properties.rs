//! Chunk-boundary invariance of the frame decoder.

use livefeed_protocol::{Frame, FrameDecoder};
use proptest::prelude::*;

fn frame_strategy() -> impl Strategy<Value = (String, Vec<String>)> {
    (
        "[a-z]{1,8}",
        prop::collection::vec("[a-zA-Z0-9{}\",: ]{0,24}", 1..4),
    )
}

fn encode(frames: &[(String, Vec<String>)], line_end: &str) -> Vec<u8> {
    let mut out = String::new();
    for (event, data) in frames {
        out.push_str(&format!(": keep-alive{line_end}"));
        out.push_str(&format!("event: {event}{line_end}"));
        for line in data {
            out.push_str(&format!("data: {line}{line_end}"));
        }
        out.push_str(line_end);
    }
    out.into_bytes()
}

fn decode_in_chunks(bytes: &[u8], cuts: &[usize]) -> Vec<Frame> {
    let mut points: Vec<usize> = cuts.iter().map(|cut| cut % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut start = 0;
    for point in points {
        frames.extend(decoder.push(&bytes[start..point]));
        start = point;
    }
    frames.extend(decoder.push(&bytes[start..]));
    frames
}

proptest! {
    #[test]
    fn chunking_never_changes_the_frames(
        frames in prop::collection::vec(frame_strategy(), 1..6),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
        crlf in any::<bool>(),
    ) {
        let line_end = if crlf { "\r\n" } else { "\n" };
        let bytes = encode(&frames, line_end);

        let whole = decode_in_chunks(&bytes, &[]);
        let chunked = decode_in_chunks(&bytes, &cuts);

        prop_assert_eq!(whole.len(), frames.len());
        prop_assert_eq!(&whole, &chunked);
        for (decoded, (event, data)) in whole.iter().zip(frames.iter()) {
            prop_assert_eq!(&decoded.event, event);
            prop_assert_eq!(&decoded.data, &data.join("\n"));
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)) {
        let mut decoder = FrameDecoder::new();
        for chunk in &chunks {
            let _ = decoder.push(chunk);
        }
        decoder.finish();
        prop_assert_eq!(decoder.buffered(), 0);
    }
}
