use rand::Rng;

/// Source of unique message identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `<unix-millis>-<9 base36 chars>` identifiers; shorter than a UUID but still
/// collision-free in practice within one session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampIdGenerator;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

impl IdGenerator for TimestampIdGenerator {
    fn generate_id(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!("{millis}-{suffix}")
    }
}
