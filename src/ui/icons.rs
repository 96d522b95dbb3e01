//! Shared status glyphs, with ASCII fallbacks for terminals without
//! unicode support.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>] ");
pub static STAGE: Emoji<'_, '_> = Emoji("🔷 ", "== ");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY] ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP] ");
pub static STOP: Emoji<'_, '_> = Emoji("🛑 ", "[STOP] ");
pub static COMMIT: Emoji<'_, '_> = Emoji("📌 ", "[COMMIT] ");
