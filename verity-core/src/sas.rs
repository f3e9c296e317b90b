//! SAS: Short Authentication String encoding.
//!
//! Both encodings are pure functions of the derived SAS bytes, so two
//! peers holding the same shared secret always display the same codes.
//!
//! ## Algorithm
//! ```text
//! decimal: bits  0..13, 13..26, 26..39  -> each + 1000  (range 1000..=9191)
//! emoji:   bits  0..6, 6..12, ..., 36..42 -> index into EMOJI_TABLE
//! ```
//! Bit 0 is the most significant bit of the first byte.

use crate::constants::{
    SAS_BYTES_LENGTH, SAS_DECIMAL_COUNT, SAS_DECIMAL_OFFSET, SAS_EMOJI_COUNT, SAS_EMOJI_TABLE_SIZE,
};
use crate::crypto::SasBytes;

/// One entry of the emoji table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Emoji {
    pub symbol: &'static str,
    pub description: &'static str,
}

const fn emoji(symbol: &'static str, description: &'static str) -> Emoji {
    Emoji {
        symbol,
        description,
    }
}

/// The fixed, ordered emoji table. Index = 6-bit value.
pub const EMOJI_TABLE: [Emoji; SAS_EMOJI_TABLE_SIZE] = [
    emoji("🐶", "Dog"),
    emoji("🐱", "Cat"),
    emoji("🦁", "Lion"),
    emoji("🐎", "Horse"),
    emoji("🦄", "Unicorn"),
    emoji("🐷", "Pig"),
    emoji("🐘", "Elephant"),
    emoji("🐰", "Rabbit"),
    emoji("🐼", "Panda"),
    emoji("🐓", "Rooster"),
    emoji("🐧", "Penguin"),
    emoji("🐢", "Turtle"),
    emoji("🐟", "Fish"),
    emoji("🐙", "Octopus"),
    emoji("🦋", "Butterfly"),
    emoji("🌷", "Flower"),
    emoji("🌳", "Tree"),
    emoji("🌵", "Cactus"),
    emoji("🍄", "Mushroom"),
    emoji("🌏", "Globe"),
    emoji("🌙", "Moon"),
    emoji("☁️", "Cloud"),
    emoji("🔥", "Fire"),
    emoji("🍌", "Banana"),
    emoji("🍎", "Apple"),
    emoji("🍓", "Strawberry"),
    emoji("🌽", "Corn"),
    emoji("🍕", "Pizza"),
    emoji("🎂", "Cake"),
    emoji("❤️", "Heart"),
    emoji("😀", "Smiley"),
    emoji("🤖", "Robot"),
    emoji("🎩", "Hat"),
    emoji("👓", "Glasses"),
    emoji("🔧", "Spanner"),
    emoji("🎅", "Santa"),
    emoji("👍", "Thumbs Up"),
    emoji("☂️", "Umbrella"),
    emoji("⌛", "Hourglass"),
    emoji("⏰", "Clock"),
    emoji("🎁", "Gift"),
    emoji("💡", "Light Bulb"),
    emoji("📕", "Book"),
    emoji("✏️", "Pencil"),
    emoji("📎", "Paperclip"),
    emoji("✂️", "Scissors"),
    emoji("🔒", "Lock"),
    emoji("🔑", "Key"),
    emoji("🔨", "Hammer"),
    emoji("☎️", "Telephone"),
    emoji("🏁", "Flag"),
    emoji("🚂", "Train"),
    emoji("🚲", "Bicycle"),
    emoji("✈️", "Aeroplane"),
    emoji("🚀", "Rocket"),
    emoji("🏆", "Trophy"),
    emoji("⚽", "Ball"),
    emoji("🎸", "Guitar"),
    emoji("🎺", "Trumpet"),
    emoji("🔔", "Bell"),
    emoji("⚓", "Anchor"),
    emoji("🎧", "Headphones"),
    emoji("📁", "Folder"),
    emoji("📌", "Pin"),
];

fn as_u64(bytes: &[u8; SAS_BYTES_LENGTH]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Three decimal groups in `1000..=9191`.
pub fn decimal(sas: &SasBytes) -> [u16; SAS_DECIMAL_COUNT] {
    let bits = as_u64(sas.as_bytes());
    let total = (SAS_BYTES_LENGTH * 8) as u32;
    core::array::from_fn(|i| {
        let shift = total - 13 * (i as u32 + 1);
        ((bits >> shift) & 0x1FFF) as u16 + SAS_DECIMAL_OFFSET
    })
}

/// Seven table indices in `0..64`.
pub fn emoji_indices(sas: &SasBytes) -> [u8; SAS_EMOJI_COUNT] {
    let bits = as_u64(sas.as_bytes());
    let total = (SAS_BYTES_LENGTH * 8) as u32;
    core::array::from_fn(|i| {
        let shift = total - 6 * (i as u32 + 1);
        ((bits >> shift) & 0x3F) as u8
    })
}

/// Seven emoji looked up in [`EMOJI_TABLE`].
pub fn emoji_symbols(sas: &SasBytes) -> [Emoji; SAS_EMOJI_COUNT] {
    emoji_indices(sas).map(|i| EMOJI_TABLE[usize::from(i)])
}
