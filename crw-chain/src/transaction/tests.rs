use std::convert::TryFrom;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize};
use crate::transparent::{self, CoinbaseData, OutPoint, Script};

use super::{LockTime, Transaction};

fn sample_prevout_input(witness: Vec<Vec<u8>>) -> transparent::Input {
    transparent::Input::PrevOut {
        outpoint: OutPoint {
            hash: super::Hash([1u8; 32]),
            index: 0,
        },
        unlock_script: Script(vec![0x76, 0xa9]),
        sequence: 0xffff_ffff,
        witness,
    }
}

fn sample_output() -> transparent::Output {
    transparent::Output {
        value: crate::amount::Amount::try_from(50_000i64).unwrap(),
        lock_script: Script(vec![0x76, 0xa9, 0x14]),
    }
}

#[test]
fn legacy_transaction_roundtrip() {
    let tx = Transaction::new(
        1,
        vec![sample_prevout_input(Vec::new())],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );

    let bytes = tx.bitcoin_serialize_to_vec().expect("serializes");
    let tx2 = Transaction::bitcoin_deserialize(&bytes[..]).expect("deserializes");
    assert_eq!(tx.hash(), tx2.hash());
    assert_eq!(tx.inputs, tx2.inputs);
    assert_eq!(tx.outputs, tx2.outputs);
}

#[test]
fn segwit_transaction_roundtrip_preserves_witness() {
    let tx = Transaction::new(
        1,
        vec![sample_prevout_input(vec![vec![1, 2, 3], vec![4, 5]])],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );

    let bytes = tx.bitcoin_serialize_to_vec().expect("serializes");
    let tx2 = Transaction::bitcoin_deserialize(&bytes[..]).expect("deserializes");

    match &tx2.inputs[0] {
        transparent::Input::PrevOut { witness, .. } => {
            assert_eq!(witness, &vec![vec![1, 2, 3], vec![4, 5]]);
        }
        _ => panic!("expected PrevOut input"),
    }
}

#[test]
fn txid_excludes_witness_data() {
    let legacy = Transaction::new(
        1,
        vec![sample_prevout_input(Vec::new())],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );
    let with_witness = Transaction::new(
        1,
        vec![sample_prevout_input(vec![vec![9, 9, 9]])],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );

    assert_eq!(legacy.hash(), with_witness.hash());
}

#[test]
fn wtxid_differs_from_txid_when_witness_present() {
    let legacy = Transaction::new(
        1,
        vec![sample_prevout_input(Vec::new())],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );
    assert_eq!(legacy.wtxid(), legacy.hash());

    let with_witness = Transaction::new(
        1,
        vec![sample_prevout_input(vec![vec![9, 9, 9]])],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );
    assert_ne!(with_witness.wtxid(), with_witness.hash());
}

#[test]
fn coinbase_input_roundtrips() {
    let tx = Transaction::new(
        1,
        vec![transparent::Input::Coinbase {
            height: None,
            data: CoinbaseData(vec![0x03, 0x01, 0x02, 0x03]),
            sequence: 0xffff_ffff,
        }],
        vec![sample_output()],
        LockTime::Height(crate::block::Height(0)),
    );

    assert!(tx.is_coinbase());
    let bytes = tx.bitcoin_serialize_to_vec().expect("serializes");
    let tx2 = Transaction::bitcoin_deserialize(&bytes[..]).expect("deserializes");
    assert!(tx2.is_coinbase());
}

#[test]
fn hash_display_fromstr_roundtrip() {
    let hash = super::Hash([7u8; 32]);
    let text = format!("{}", hash);
    let parsed: super::Hash = text.parse().expect("hash should parse");
    assert_eq!(hash, parsed);
}
