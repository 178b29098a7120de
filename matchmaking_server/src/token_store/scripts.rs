const ENQUEUE_USER_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/ENQUEUE_USER.lua"
));
const DEQUEUE_USER_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/DEQUEUE_USER.lua"
));
const SAFE_REQUEUE_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/SAFE_REQUEUE.lua"
));
const PUBLISH_MATCHED_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/PUBLISH_MATCHED.lua"
));

pub fn enqueue_user_script() -> &'static str {
    ENQUEUE_USER_SCRIPT
}

pub fn dequeue_user_script() -> &'static str {
    DEQUEUE_USER_SCRIPT
}

pub fn safe_requeue_script() -> &'static str {
    SAFE_REQUEUE_SCRIPT
}

pub fn publish_matched_script() -> &'static str {
    PUBLISH_MATCHED_SCRIPT
}
