use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tn3270r::telnet::{TelnetSession, TelnetSettings};
use tn3270r::telnet::codes::escape_iac_into;
use tn3270r::tn3270e::{frame_record, Tn3270eHeader};
use tn3270r::NullSink;

const IAC: u8 = 0xff;
const EOR: u8 = 0xef;

/// Host side of a plain TN3270 negotiation
fn tn3270_negotiation() -> Vec<u8> {
    vec![
        IAC, 0xfd, 24, // DO TTYPE
        IAC, 0xfa, 24, 1, IAC, 0xf0, // SB TTYPE SEND SE
        IAC, 0xfd, 25, IAC, 0xfb, 25, // DO/WILL EOR
        IAC, 0xfd, 0, IAC, 0xfb, 0, // DO/WILL BINARY
    ]
}

/// A full-screen Write with a sprinkling of 0xFF bytes that need escaping
fn screen_record() -> Vec<u8> {
    let mut record = vec![0xf5, 0xc3, 0x11, 0x40, 0x40];
    for i in 0..1920u32 {
        record.push(if i % 97 == 0 { 0xff } else { 0xc1 + (i % 9) as u8 });
    }
    record
}

fn bench_3270_records(c: &mut Criterion) {
    let mut wire = Vec::new();
    escape_iac_into(&mut wire, &screen_record());
    wire.extend_from_slice(&[IAC, EOR]);
    let stream: Vec<u8> = wire.iter().copied().cycle().take(wire.len() * 16).collect();

    let mut group = c.benchmark_group("telnet_inbound");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("3270_records", |b| {
        let mut session = TelnetSession::new(TelnetSettings::default());
        session.process(&tn3270_negotiation(), &mut NullSink).unwrap();
        session.take_output();
        b.iter(|| {
            let processed = session.process(black_box(&stream), &mut NullSink).unwrap();
            black_box(processed.consumed);
        })
    });
    group.bench_function("3270_records_small_reads", |b| {
        let mut session = TelnetSession::new(TelnetSettings::default());
        session.process(&tn3270_negotiation(), &mut NullSink).unwrap();
        session.take_output();
        b.iter(|| {
            for chunk in stream.chunks(64) {
                session.process(black_box(chunk), &mut NullSink).unwrap();
            }
        })
    });
    group.finish();
}

fn bench_nvt_text(c: &mut Criterion) {
    let text: Vec<u8> = b"READY\r\nlistcat level(sys1)\r\n".iter().copied().cycle().take(8192).collect();

    c.bench_function("telnet_inbound/nvt_text", |b| {
        let mut session = TelnetSession::new(TelnetSettings::default());
        b.iter(|| {
            session.process(black_box(&text), &mut NullSink).unwrap();
        })
    });
}

fn bench_tn3270e_framing(c: &mut Criterion) {
    let payload = screen_record();

    c.bench_function("tn3270e/frame_record", |b| {
        let mut seq = 0u16;
        b.iter(|| {
            let header = Tn3270eHeader::new(0, seq);
            seq = (seq + 1) % 0x8000;
            black_box(frame_record(&header, black_box(&payload)))
        })
    });

    c.bench_function("tn3270e/escape_iac", |b| {
        let mut out = Vec::with_capacity(payload.len() * 2);
        b.iter(|| {
            out.clear();
            escape_iac_into(&mut out, black_box(&payload));
            black_box(out.len())
        })
    });
}

criterion_group!(benches, bench_3270_records, bench_nvt_text, bench_tn3270e_framing);
criterion_main!(benches);
