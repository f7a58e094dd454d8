use tokio_util::codec::LengthDelimitedCodec;

use crate::point::Batch;
use ms_base::Result;

/// Max payload for the ingress listener (client -> node).
pub const INGRESS_MAX_FRAME_BYTES: usize = 32 * 1024;
/// Max payload for the internode listener (peer -> peer); twice the ingress
/// cap since internode batches may bundle several client batches.
pub const INTERNODE_MAX_FRAME_BYTES: usize = 2 * INGRESS_MAX_FRAME_BYTES;

/// A length-delimited codec configured with the given max frame size.
/// Oversize frames are rejected by the codec itself, closing the connection,
/// per the bounded-frame back-pressure policy.
pub fn codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(batch)?)
}

pub fn decode_batch(bytes: &[u8]) -> Result<Batch> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::point::Point;

    #[test]
    fn batch_round_trips() {
        let mut batch = Batch::new();
        batch.push(Point::new("cpu_usage", 1, 0.5).with_label("source_id", "1"));
        let bytes = encode_batch(&batch).unwrap();
        let decoded = decode_batch(&bytes).unwrap();
        assert_eq!(batch, decoded);
    }
}
