#![no_main]

use libfuzzer_sys::fuzz_target;

use vault_types::codec::{decode_datum, decode_redeemer, encode_datum, encode_redeemer};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must re-encode to bytes that decode the same.
    if let Ok(datum) = decode_datum(data) {
        let bytes = encode_datum(&datum).expect("decoded datum re-encodes");
        assert_eq!(decode_datum(&bytes).expect("re-encoded datum decodes"), datum);
    }
    if let Ok(redeemer) = decode_redeemer(data) {
        let bytes = encode_redeemer(&redeemer).expect("decoded redeemer re-encodes");
        assert_eq!(decode_redeemer(&bytes).expect("re-encoded redeemer decodes"), redeemer);
    }
});
