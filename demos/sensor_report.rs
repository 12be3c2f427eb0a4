use bitgrammar::{FieldType, Ref, Token};
use tracing::error;

/// Parses a small telemetry frame and prints it as JSON.
///
/// Frame layout: 4-bit version, 4-bit status bitmask, 8-bit report kind,
/// 4-bit channel count, then per channel a 4-bit id and an 8-bit raw
/// reading scaled to volts.
fn main() {
    tracing_subscriber::fmt::init();

    let frame = Token::sequence([
        Token::uint(4).named("version"),
        Token::bitmask(4, ["low_battery", "tamper", "stale", "test_mode"]).named("status"),
        Token::enumeration(8, ["PERIODIC", "ON_DEMAND", "ALARM"], 0).named("kind"),
        Token::uint(4).named("count"),
        Token::repeat(
            Ref::new("count"),
            [
                Token::uint(4).named("channel"),
                Token::uint(8)
                    .named("reading")
                    .with_type(FieldType::new().with_factor(0.25).with_unit("V")),
            ],
        )
        .named("channels"),
    ])
    .named("sensor_report");

    let data = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0x25013040178290".to_owned());

    match frame.deserialize(data.as_str()) {
        Ok(report) => println!("{report}"),
        Err(e) => error!("{e}"),
    }
}
