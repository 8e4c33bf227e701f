pub mod intent;

pub use intent::{IntentKey, IntentScope, IntentStore, JsonFileIntentStore, MemoryIntentStore};
