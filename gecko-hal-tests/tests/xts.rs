use gecko_hal_common::aes::{
    data_unit_from_sector, gf128mul_x_ble, Direction, Error, XtsContext, MAX_DATA_UNIT_LEN,
};
use gecko_hal_common::crypto::{sim::SimCrypto, Config, Crypto};

struct Vector {
    key: &'static str,
    sector: u64,
    plain: &'static str,
    cipher: &'static str,
}

// IEEE P1619/D16, Annex B
const VECTORS: &[Vector] = &[
    // Vector 1
    Vector {
        key: "0000000000000000000000000000000000000000000000000000000000000000",
        sector: 0,
        plain: "0000000000000000000000000000000000000000000000000000000000000000",
        cipher: "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e",
    },
    // Vector 2
    Vector {
        key: "1111111111111111111111111111111122222222222222222222222222222222",
        sector: 0x33_3333_3333,
        plain: "4444444444444444444444444444444444444444444444444444444444444444",
        cipher: "c454185e6a16936e39334038acef838bfb186fff7480adc4289382ecd6d394f0",
    },
    // Vector 3
    Vector {
        key: "fffefdfcfbfaf9f8f7f6f5f4f3f2f1f022222222222222222222222222222222",
        sector: 0x33_3333_3333,
        plain: "4444444444444444444444444444444444444444444444444444444444444444",
        cipher: "af85336b597afc1a900b2eb21ec949d292df4c047e0b21532186a5971a227a89",
    },
    // Vectors 15 to 18: ciphertext stealing
    Vector {
        key: "fffefdfcfbfaf9f8f7f6f5f4f3f2f1f0bfbebdbcbbbab9b8b7b6b5b4b3b2b1b0",
        sector: 0x12_3456_789a,
        plain: "000102030405060708090a0b0c0d0e0f10",
        cipher: "6c1625db4671522d3d7599601de7ca09ed",
    },
    Vector {
        key: "fffefdfcfbfaf9f8f7f6f5f4f3f2f1f0bfbebdbcbbbab9b8b7b6b5b4b3b2b1b0",
        sector: 0x12_3456_789a,
        plain: "000102030405060708090a0b0c0d0e0f1011",
        cipher: "d069444b7a7e0cab09e24447d24deb1fedbf",
    },
    Vector {
        key: "fffefdfcfbfaf9f8f7f6f5f4f3f2f1f0bfbebdbcbbbab9b8b7b6b5b4b3b2b1b0",
        sector: 0x12_3456_789a,
        plain: "000102030405060708090a0b0c0d0e0f101112",
        cipher: "e5df1351c0544ba1350b3363cd8ef4beedbf9d",
    },
    Vector {
        key: "fffefdfcfbfaf9f8f7f6f5f4f3f2f1f0bfbebdbcbbbab9b8b7b6b5b4b3b2b1b0",
        sector: 0x12_3456_789a,
        plain: "000102030405060708090a0b0c0d0e0f10111213",
        cipher: "9d84c813f719aa2c7be3f66171c7c5c2edbf9dac",
    },
];

#[test]
fn ieee1619_vectors() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());

    for (i, v) in VECTORS.iter().enumerate() {
        let key = hex::decode(v.key).unwrap();
        let plain = hex::decode(v.plain).unwrap();
        let du = data_unit_from_sector(v.sector);

        let mut enc = XtsContext::new();
        enc.setkey_enc(&key, 256).unwrap();
        let mut cipher = vec![0; plain.len()];
        enc.crypt_xts(&crypto, Direction::Encrypt, &du, &plain, &mut cipher)
            .unwrap();
        assert_eq!(hex::encode(&cipher), v.cipher, "vector #{}", i);

        let mut dec = XtsContext::new();
        dec.setkey_dec(&crypto, &key, 256).unwrap();
        let mut back = vec![0; plain.len()];
        dec.crypt_xts(&crypto, Direction::Decrypt, &du, &cipher, &mut back)
            .unwrap();
        assert_eq!(back, plain, "vector #{}", i);
    }
}

// IEEE P1619/D16, Annex B, vector 10: XTS-AES-256 over a 512-byte sector.
#[test]
fn ieee1619_vector_10_xts_aes256() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let key = hex::decode(concat!(
        "2718281828459045235360287471352662497757247093699959574966967627",
        "3141592653589793238462643383279502884197169399375105820974944592",
    ))
    .unwrap();
    let plain: Vec<u8> = (0..512).map(|i| i as u8).collect();
    let expected = concat!(
        "1c3b3a102f770386e4836c99e370cf9bea00803f5e482357a4ae12d414a3e63b",
        "5d31e276f8fe4a8d66b317f9ac683f44680a86ac35adfc3345befecb4bb188fd",
        "5776926c49a3095eb108fd1098baec70aaa66999a72a82f27d848b21d4a741b0",
        "c5cd4d5fff9dac89aeba122961d03a757123e9870f8acf1000020887891429ca",
        "2a3e7a7d7df7b10355165c8b9a6d0a7de8b062c4500dc4cd120c0f7418dae3d0",
        "b5781c34803fa75421c790dfe1de1834f280d7667b327f6c8cd7557e12ac3a0f",
        "93ec05c52e0493ef31a12d3d9260f79a289d6a379bc70c50841473d1a8cc81ec",
        "583e9645e07b8d9670655ba5bbcfecc6dc3966380ad8fecb17b6ba02469a020a",
        "84e18e8f84252070c13e9f1f289be54fbc481457778f616015e1327a02b140f1",
        "505eb309326d68378f8374595c849d84f4c333ec4423885143cb47bd71c5edae",
        "9be69a2ffeceb1bec9de244fbe15992b11b77c040f12bd8f6a975a44a0f90c29",
        "a9abc3d4d893927284c58754cce294529f8614dcd2aba991925fedc4ae74ffac",
        "6e333b93eb4aff0479da9a410e4450e0dd7ae4c6e2910900575da401fc07059f",
        "645e8b7e9bfdef33943054ff84011493c27b3429eaedb4ed5376441a77ed4385",
        "1ad77f16f541dfd269d50d6a5f14fb0aab1cbb4c1550be97f7ab4066193c4caa",
        "773dad38014bd2092fa755c824bb5e54c4f36ffda9fcea70b9c6e693e148c151",
    );
    let du = data_unit_from_sector(0xff);

    let mut enc = XtsContext::new();
    enc.setkey_enc(&key, 512).unwrap();
    let mut cipher = vec![0; plain.len()];
    enc.crypt_xts(&crypto, Direction::Encrypt, &du, &plain, &mut cipher)
        .unwrap();
    assert_eq!(hex::encode(&cipher), expected);

    let mut dec = XtsContext::new();
    dec.setkey_dec(&crypto, &key, 512).unwrap();
    let mut back = vec![0; plain.len()];
    dec.crypt_xts(&crypto, Direction::Decrypt, &du, &cipher, &mut back)
        .unwrap();
    assert_eq!(back, plain);
}

#[test]
fn xts_aes256_round_trips_every_tail_length() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let key: Vec<u8> = (0..64u8).map(|b| b ^ 0xa5).collect();
    let mut enc = XtsContext::new();
    enc.setkey_enc(&key, 512).unwrap();
    let mut dec = XtsContext::new();
    dec.setkey_dec(&crypto, &key, 512).unwrap();

    let du = data_unit_from_sector(7);
    for len in 16..=80 {
        let plain: Vec<u8> = (0..len).map(|i| (i * 13) as u8).collect();
        let mut cipher = vec![0; len];
        let mut back = vec![0; len];
        enc.crypt_xts(&crypto, Direction::Encrypt, &du, &plain, &mut cipher)
            .unwrap();
        assert_ne!(cipher, plain);
        dec.crypt_xts(&crypto, Direction::Decrypt, &du, &cipher, &mut back)
            .unwrap();
        assert_eq!(back, plain, "length {}", len);
    }
}

#[test]
fn stealing_keeps_the_common_prefix_of_blocks() {
    // Only the last whole block and the tail change when a tail is added.
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let mut ctx = XtsContext::new();
    ctx.setkey_enc(&[0x42; 32], 256).unwrap();
    let du = data_unit_from_sector(1);

    let plain: Vec<u8> = (0..40u8).collect();
    let mut aligned = vec![0; 32];
    let mut stolen = vec![0; 40];
    ctx.crypt_xts(&crypto, Direction::Encrypt, &du, &plain[..32], &mut aligned)
        .unwrap();
    ctx.crypt_xts(&crypto, Direction::Encrypt, &du, &plain, &mut stolen)
        .unwrap();

    assert_eq!(stolen[..16], aligned[..16]);
    assert_eq!(stolen[32..], aligned[16..24]);
}

#[test]
fn length_limits() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let mut ctx = XtsContext::new();
    ctx.setkey_enc(&[0; 64], 512).unwrap();
    let du = [0; 16];

    let mut out = [0; 15];
    let err = ctx
        .crypt_xts(&crypto, Direction::Encrypt, &du, &[0; 15], &mut out)
        .unwrap_err();
    assert_eq!(err, Error::InvalidInputLength);

    let input = vec![0u8; MAX_DATA_UNIT_LEN + 1];
    let mut out = vec![0u8; input.len()];
    assert_eq!(
        ctx.crypt_xts(&crypto, Direction::Encrypt, &du, &input, &mut out),
        Err(Error::InvalidInputLength)
    );
}

#[test]
fn largest_data_unit_is_accepted() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let mut ctx = XtsContext::new();
    ctx.setkey_enc(&[0x11; 32], 256).unwrap();
    let du = data_unit_from_sector(3);

    let input = vec![0x5au8; MAX_DATA_UNIT_LEN];
    let mut out = vec![0u8; input.len()];
    ctx.crypt_xts(&crypto, Direction::Encrypt, &du, &input, &mut out)
        .unwrap();

    // Aligned units share their leading blocks with any shorter unit.
    let mut head = [0u8; 64];
    ctx.crypt_xts(&crypto, Direction::Encrypt, &du, &input[..64], &mut head)
        .unwrap();
    assert_eq!(out[..64], head[..]);
    assert!(!crypto.is_acquired());
}

#[test]
fn tweak_doubling_matches_the_polynomial() {
    let mut t = data_unit_from_sector(1);
    for _ in 0..127 {
        gf128mul_x_ble(&mut t);
    }
    let mut top = [0u8; 16];
    top[15] = 0x80;
    assert_eq!(t, top);

    gf128mul_x_ble(&mut t);
    let mut reduced = [0u8; 16];
    reduced[0] = 0x87;
    assert_eq!(t, reduced);
}

#[test]
fn unkeyed_context_is_rejected() {
    let crypto = Crypto::new(SimCrypto::new(), Config::default());
    let ctx = XtsContext::new();
    let mut out = [0; 16];
    assert_eq!(
        ctx.crypt_xts(&crypto, Direction::Encrypt, &[0; 16], &[0; 16], &mut out),
        Err(Error::InvalidKeyLength)
    );
}
