use super::*;

#[test]
fn no_false_negatives() {
    let keys: Vec<Vec<u8>> = (0..1000).map(|i| format!("key-{i}").into_bytes()).collect();
    let filter = Filter::from_keys(keys.iter().map(|k| k.as_slice()), keys.len(), 0.01);

    for key in &keys {
        assert!(filter.may_contain(key));
    }
}

#[test]
fn false_positive_rate_is_roughly_honoured() {
    let inserted: Vec<Vec<u8>> = (0..2000).map(|i| format!("in-{i}").into_bytes()).collect();
    let filter = Filter::from_keys(inserted.iter().map(|k| k.as_slice()), inserted.len(), 0.01);

    let mut false_positives = 0;
    let probes = 10_000;
    for i in 0..probes {
        if filter.may_contain(format!("out-{i}").as_bytes()) {
            false_positives += 1;
        }
    }
    // target 1%; allow generous slack for hash variance
    assert!(
        false_positives < probes / 20,
        "fp rate too high: {false_positives}/{probes}"
    );
}

#[test]
fn encode_decode_round_trip() {
    let mut filter = Filter::with_capacity(100, 0.05);
    filter.insert(b"alpha");
    filter.insert(b"beta");

    let decoded = Filter::decode(&filter.encode()).unwrap();
    assert_eq!(decoded, filter);
    assert!(decoded.may_contain(b"alpha"));
    assert!(decoded.may_contain(b"beta"));
}

#[test]
fn decode_rejects_malformed_buffers() {
    assert!(Filter::decode(&[]).is_none());
    assert!(Filter::decode(&[0u8; 11]).is_none());

    // num_bits = 0
    let mut buf = vec![0u8; 12];
    buf[8] = 1; // num_hashes = 1
    assert!(Filter::decode(&buf).is_none());

    // declared bit length disagrees with the buffer
    let filter = Filter::with_capacity(100, 0.01);
    let mut bytes = filter.encode();
    bytes.pop();
    assert!(Filter::decode(&bytes).is_none());
}

#[test]
fn empty_filter_rejects_everything() {
    let filter = Filter::with_capacity(10, 0.01);
    assert!(!filter.may_contain(b"anything"));
}

#[test]
fn degenerate_parameters_are_clamped() {
    let f = Filter::with_capacity(0, 2.0);
    assert!(f.num_bits() >= 64);
    assert!(f.num_hashes() >= 1);
}
