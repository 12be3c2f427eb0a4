use bitgrammar::{BitStream, Token, Tree};
use proptest::prelude::*;
use serde_json::json;

/// Blueprint for a random token tree together with the values each
/// terminal should parse back out.
#[derive(Clone, Debug)]
enum Plan {
    Bits { width: usize, value: u64 },
    Pad { width: usize },
    Seq { children: Vec<Plan> },
    Repeat { body_widths: Vec<usize>, rows: Vec<Vec<u64>> },
    Choice { sel_width: usize, chosen: u64, arms: Vec<Vec<(usize, u64)>> },
}

fn mask(value: u64, width: usize) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1 << width) - 1)
    }
}

fn leaf() -> impl Strategy<Value = Plan> {
    prop_oneof![
        (1_usize..=16, any::<u64>()).prop_map(|(width, value)| Plan::Bits { width, value }),
        (1_usize..=8).prop_map(|width| Plan::Pad { width }),
    ]
}

fn repeat_plan() -> impl Strategy<Value = Plan> {
    (
        prop::collection::vec(1_usize..=8, 1..=3),
        prop::collection::vec(prop::collection::vec(any::<u64>(), 3), 0..=3),
    )
        .prop_map(|(body_widths, rows)| Plan::Repeat { body_widths, rows })
}

fn choice_plan() -> impl Strategy<Value = Plan> {
    (1_usize..=2).prop_flat_map(|sel_width| {
        let arm_count = 1_usize << sel_width;
        (
            Just(sel_width),
            0..(arm_count as u64),
            prop::collection::vec(
                prop::collection::vec((1_usize..=8, any::<u64>()), 1..=2),
                arm_count,
            ),
        )
            .prop_map(|(sel_width, chosen, arms)| Plan::Choice {
                sel_width,
                chosen,
                arms,
            })
    })
}

fn plan() -> impl Strategy<Value = Plan> {
    let inner = leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner, 1..=4).prop_map(|children| Plan::Seq { children }),
            repeat_plan(),
            choice_plan(),
        ]
    });
    prop::collection::vec(inner, 1..=4).prop_map(|children| Plan::Seq { children })
}

/// MSB-first bit packer, the write-side mirror of [`BitStream`].
#[derive(Default)]
struct BitSink {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitSink {
    fn push(&mut self, value: u64, width: usize) {
        for i in (0..width).rev() {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            if value >> i & 1 != 0 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (7 - self.bits % 8);
            }
            self.bits += 1;
        }
    }
}

struct Namer {
    counter: usize,
}

impl Namer {
    // Zero-padded so lexical order matches insertion order
    fn next(&mut self) -> String {
        let name = format!("f{:04}", self.counter);
        self.counter += 1;
        name
    }
}

enum Built {
    Field(String, serde_json::Value),
    Merge(serde_json::Map<String, serde_json::Value>),
    Nothing,
}

fn build(plan: &Plan, namer: &mut Namer, sink: &mut BitSink) -> (Token, Built) {
    match plan {
        Plan::Bits { width, value } => {
            let name = namer.next();
            let value = mask(*value, *width);
            sink.push(value, *width);
            (
                Token::uint(*width).named(&name),
                Built::Field(name, json!(value)),
            )
        }
        Plan::Pad { width } => {
            sink.push(0, *width);
            (Token::pad(*width), Built::Nothing)
        }
        Plan::Seq { children } => {
            let name = namer.next();
            let (tokens, map) = build_record(children, namer, sink);
            (
                Token::sequence(tokens).named(&name),
                Built::Field(name, serde_json::Value::Object(map)),
            )
        }
        Plan::Repeat { body_widths, rows } => {
            let name = namer.next();
            let body: Vec<(String, usize)> = body_widths
                .iter()
                .map(|w| (namer.next(), *w))
                .collect();
            let tokens: Vec<Token> = body
                .iter()
                .map(|(n, w)| Token::uint(*w).named(n))
                .collect();
            let mut items = Vec::new();
            for row in rows {
                let mut record = serde_json::Map::new();
                for ((n, w), value) in body.iter().zip(row) {
                    let value = mask(*value, *w);
                    sink.push(value, *w);
                    record.insert(n.clone(), json!(value));
                }
                items.push(serde_json::Value::Object(record));
            }
            (
                Token::repeat(rows.len() as u64, tokens).named(&name),
                Built::Field(name, serde_json::Value::Array(items)),
            )
        }
        Plan::Choice { sel_width, chosen, arms } => {
            let mut alternatives = Vec::new();
            let mut merged = serde_json::Map::new();
            sink.push(*chosen, *sel_width);
            for (tag, arm) in arms.iter().enumerate() {
                let mut tokens = Vec::new();
                for (w, value) in arm {
                    let field = namer.next();
                    tokens.push(Token::uint(*w).named(&field));
                    if tag as u64 == *chosen {
                        let value = mask(*value, *w);
                        sink.push(value, *w);
                        merged.insert(field, json!(value));
                    }
                }
                alternatives.push((tag as i128, Token::sequence(tokens)));
            }
            (
                Token::choice(*sel_width, alternatives),
                Built::Merge(merged),
            )
        }
    }
}

fn build_record(
    children: &[Plan],
    namer: &mut Namer,
    sink: &mut BitSink,
) -> (Vec<Token>, serde_json::Map<String, serde_json::Value>) {
    let mut tokens = Vec::new();
    let mut map = serde_json::Map::new();
    for child in children {
        let (token, built) = build(child, namer, sink);
        tokens.push(token);
        match built {
            Built::Field(name, value) => {
                map.insert(name, value);
            }
            Built::Merge(entries) => {
                for (name, value) in entries {
                    map.insert(name, value);
                }
            }
            Built::Nothing => {}
        }
    }
    (tokens, map)
}

proptest! {
    #[test]
    fn random_trees_parse_back_to_their_packed_values(plan in plan()) {
        let mut namer = Namer { counter: 0 };
        let mut sink = BitSink::default();
        let Plan::Seq { children } = &plan else { unreachable!() };
        let (tokens, expected) = build_record(children, &mut namer, &mut sink);
        let token = Token::sequence(tokens);
        let bit_len = sink.bits;

        let stream = BitStream::with_len(sink.bytes, bit_len).unwrap();
        let msg = token.deserialize(stream.clone()).unwrap();
        prop_assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::Value::Object(expected)
        );

        // Consumed bits equal the sum of demanded widths
        let mut stream = stream;
        let mut tree = Tree::new();
        token.parse(&mut stream, &mut tree, None).unwrap();
        prop_assert_eq!(stream.pos(), bit_len);
    }
}
