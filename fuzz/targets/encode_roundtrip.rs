#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use zumq::{network::wire::Frame, Outcome};

#[derive(Debug, Arbitrary)]
enum FuzzOutcome {
    Accepted,
    Rejected,
    Released,
}

#[derive(Debug, Arbitrary)]
enum FuzzFrame {
    Flow { handle: u32, credit: u32 },
    Transfer { handle: u32, delivery_id: u64, payload: Vec<u8> },
    Disposition { handle: u32, delivery_id: u64, outcome: FuzzOutcome },
    Attached { handle: u32 },
}

impl From<FuzzOutcome> for Outcome {
    fn from(o: FuzzOutcome) -> Self {
        match o {
            FuzzOutcome::Accepted => Outcome::Accepted,
            FuzzOutcome::Rejected => Outcome::Rejected,
            FuzzOutcome::Released => Outcome::Released,
        }
    }
}

fuzz_target!(|input: FuzzFrame| {
    let frame = match input {
        FuzzFrame::Flow { handle, credit } => Frame::Flow { handle, credit },
        FuzzFrame::Transfer {
            handle,
            delivery_id,
            mut payload,
        } => {
            // перевод строки в нагрузке недопустим протоколом
            payload.retain(|b| *b != b'\n' && *b != b'\r');
            Frame::Transfer {
                handle,
                delivery_id,
                payload: Bytes::from(payload),
            }
        }
        FuzzFrame::Disposition {
            handle,
            delivery_id,
            outcome,
        } => Frame::Disposition {
            handle,
            delivery_id,
            outcome: outcome.into(),
        },
        FuzzFrame::Attached { handle } => Frame::Attached { handle },
    };

    let encoded = frame.to_bytes();
    let decoded = Frame::parse(&encoded).expect("encoded frame must parse");
    assert_eq!(decoded, frame);
});
