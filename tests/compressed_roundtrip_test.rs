//! Encoder/decoder agreement over randomly populated summaries
//!
//! Summaries are filled hit by hit, paired, encoded and read back; the
//! decoded frames must list modules ascending, frames ascending and hits in
//! pairing order within each frame.

use rand::prelude::*;
use rand::rngs::StdRng;

use tof_codec::compressed::{
    CompressedDecoder, CrateTrailer, EncodeError, Encoder, EncoderConfig, OverflowPolicy,
};
use tof_codec::raw::format::{
    DrmGlobalHeader, DrmGlobalTrailer, DrmStatusHeader3, RawWord,
};
use tof_codec::raw::summary::trm_slot_id;
use tof_codec::raw::{pair_hits, Chain, PairedHit, Summary, UnpackedHit, N_TRM};

/// (slot, frame, chain, tdc, channel, absolute time, tot)
type HitKey = (u8, u8, Chain, u8, u8, u32, u32);

fn empty_summary(drm_id: u32, counter: u32, bcid: u32) -> Summary {
    let mut s = Summary::new();
    s.drm_common_header = 0x4000_0000;
    s.drm_global_header = DrmGlobalHeader::new(drm_id, 0).raw();
    s.drm_status_headers[2] = DrmStatusHeader3::new(bcid).raw();
    s.drm_global_trailer = DrmGlobalTrailer::new(counter).raw();
    s
}

/// Fill `n_modules` random TRMs with random pulses; returns the expected
/// decoded hits in output order
fn populate(rng: &mut StdRng, summary: &mut Summary, n_modules: usize) -> Vec<HitKey> {
    let mut trms: Vec<usize> = (0..N_TRM).collect();
    trms.shuffle(rng);
    trms.truncate(n_modules);

    // (trm, chain, tdc, arrival, key)
    let mut generated = Vec::new();
    for &itrm in &trms {
        for chain in Chain::ALL {
            for arrival in 0..rng.gen_range(0..12) {
                let tdc = rng.gen_range(0..15u32);
                let channel = rng.gen_range(0..8u32);
                let time = rng.gen_range(0..(1u32 << 21));
                let width = rng.gen_range(1..2048u32);
                summary.push_hit(itrm, chain, UnpackedHit::leading(time, channel, tdc));
                summary.push_hit(
                    itrm,
                    chain,
                    UnpackedHit::trailing((time + width) & 0x1F_FFFF, channel, tdc),
                );
                let key = (
                    trm_slot_id(itrm) as u8,
                    (time >> 13) as u8,
                    chain,
                    tdc as u8,
                    channel as u8,
                    time,
                    width,
                );
                generated.push((itrm, chain.index(), tdc, arrival, key));
            }
        }
    }

    // pairing order, then grouped by (module, frame) keeping that order
    generated.sort_by_key(|&(itrm, chain, tdc, arrival, _)| (itrm, chain, tdc, arrival));
    let mut expected: Vec<HitKey> = generated.into_iter().map(|g| g.4).collect();
    expected.sort_by_key(|k| (k.0, k.1));
    expected
}

fn decoded_keys(data: &[u8]) -> (Vec<HitKey>, u32) {
    let mut decoder = CompressedDecoder::new(data);
    let event = decoder.next_event().unwrap().unwrap();
    assert!(decoder.next_event().unwrap().is_none());

    let mut keys = Vec::new();
    let mut last = None;
    for frame in &event.frames {
        // one frame per (module, frame) pair, strictly ascending
        let id = (frame.slot_id, frame.frame_id);
        assert!(last.map_or(true, |l| l < id));
        last = Some(id);
        assert!(!frame.hits.is_empty());
        for hit in &frame.hits {
            keys.push((
                frame.slot_id,
                frame.frame_id,
                hit.chain,
                hit.tdc_id,
                hit.channel,
                hit.time,
                hit.tot,
            ));
        }
    }
    (keys, event.trailer)
}

#[test]
fn roundtrip_any_number_of_modules() {
    let mut rng = StdRng::seed_from_u64(20240611);
    for n_modules in 0..=N_TRM {
        for _ in 0..5 {
            let mut summary = empty_summary(rng.gen_range(0..128), rng.gen_range(0..4096), 77);
            let expected = populate(&mut rng, &mut summary, n_modules);

            let mut hits = Vec::new();
            pair_hits(&summary, &mut hits);
            assert_eq!(hits.len(), expected.len());

            let mut encoder = Encoder::new(EncoderConfig {
                buffer_size: 1 << 20,
                ..Default::default()
            });
            encoder.encode(&summary, &hits).unwrap();

            let (decoded, trailer) = decoded_keys(encoder.buffer());
            assert_eq!(decoded, expected, "{} modules", n_modules);
            assert_eq!(trailer, CrateTrailer::new(&[0; N_TRM], false).0);
        }
    }
}

#[test]
fn header_fields_survive() {
    let mut summary = empty_summary(127, 4095, 4095);
    summary.fault_flags.set_chain(9, Chain::B);
    summary.fault_flags.set_crate();
    let mut encoder = Encoder::with_defaults();
    encoder.encode(&summary, &[]).unwrap();

    let event = CompressedDecoder::new(encoder.buffer())
        .next_event()
        .unwrap()
        .unwrap();
    assert_eq!(event.drm_id, 127);
    assert_eq!(event.event_counter, 4095);
    assert_eq!(event.bunch_id, 4095);
    assert!(event.frames.is_empty());
    assert!(event.trailer().crate_fault());
    assert_eq!(event.trailer().trm_fault(9), 0b100);
    assert_eq!(event.trailer().trm_fault(8), 0);
}

fn single_hit(time: u32, width: u32) -> (Summary, Vec<PairedHit>) {
    let summary = empty_summary(1, 1, 1);
    let hits = vec![PairedHit {
        trm: 4,
        chain: Chain::B,
        tdc_id: 14,
        channel: 7,
        time,
        width,
        e_bit: false,
    }];
    (summary, hits)
}

#[test]
fn frame_boundary() {
    let summary = empty_summary(1, 1, 1);
    let hits: Vec<PairedHit> = [8191u32, 8192]
        .iter()
        .map(|&time| PairedHit {
            trm: 0,
            chain: Chain::A,
            tdc_id: 0,
            channel: 0,
            time,
            width: 5,
            e_bit: false,
        })
        .collect();

    let mut encoder = Encoder::with_defaults();
    encoder.encode(&summary, &hits).unwrap();
    let event = CompressedDecoder::new(encoder.buffer())
        .next_event()
        .unwrap()
        .unwrap();
    assert_eq!(event.frames.len(), 2);
    assert_eq!(event.frames[0].frame_id, 0);
    assert_eq!(event.frames[0].hits[0].time, 8191);
    assert_eq!(event.frames[1].frame_id, 1);
    assert_eq!(event.frames[1].hits[0].time, 8192);
}

#[test]
fn largest_values_fit() {
    let (summary, hits) = single_hit((1 << 21) - 1, 2047);
    let mut encoder = Encoder::with_defaults();
    encoder.encode(&summary, &hits).unwrap();
    let event = CompressedDecoder::new(encoder.buffer())
        .next_event()
        .unwrap()
        .unwrap();
    let frame = &event.frames[0];
    assert_eq!(frame.slot_id, 7);
    assert_eq!(frame.frame_id, 255);
    let hit = frame.hits[0];
    assert_eq!(hit.time, (1 << 21) - 1);
    assert_eq!(hit.tot, 2047);
    assert_eq!(hit.tdc_id, 14);
    assert_eq!(hit.channel, 7);
    assert_eq!(hit.chain, Chain::B);
}

#[test]
fn tot_overflow_policies() {
    let (summary, hits) = single_hit(100, 2048);

    let mut reject = Encoder::with_defaults();
    assert!(matches!(
        reject.encode(&summary, &hits),
        Err(EncodeError::FieldOverflow { bits: 11, .. })
    ));
    assert!(reject.buffer().is_empty());

    let mut saturate = Encoder::new(EncoderConfig {
        overflow_policy: OverflowPolicy::Saturate,
        ..Default::default()
    });
    saturate.encode(&summary, &hits).unwrap();
    let event = CompressedDecoder::new(saturate.buffer())
        .next_event()
        .unwrap()
        .unwrap();
    assert_eq!(event.frames[0].hits[0].tot, 2047);
    assert_eq!(saturate.stats().saturated_fields, 1);
}

#[test]
fn full_buffer_leaves_previous_events_intact() {
    let (summary, hits) = single_hit(100, 10);
    // crate header + frame header + hit + trailer
    let mut encoder = Encoder::new(EncoderConfig {
        buffer_size: 16 * 2 + 8,
        ..Default::default()
    });
    assert_eq!(encoder.encode(&summary, &hits).unwrap(), 16);
    assert_eq!(encoder.encode(&summary, &hits).unwrap(), 16);
    let before = encoder.buffer().to_vec();
    assert!(matches!(
        encoder.encode(&summary, &hits),
        Err(EncodeError::BufferFull { needed: 16, available: 8 })
    ));
    assert_eq!(encoder.buffer(), &before[..]);

    let events: Vec<_> = CompressedDecoder::new(encoder.buffer())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(events.len(), 2);
}
