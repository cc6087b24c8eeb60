//! Process title formatting: `<PREFIX>redwork-<VERSION>: <STATE>`.

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn set(prefix: &str, state: &str) {
    setproctitle::set_title(format!("{prefix}redwork-{VERSION}: {state}"));
}

pub fn starting(prefix: &str) {
    set(prefix, "Starting");
}

pub fn forked(prefix: &str, pids: &[u32], at_epoch: i64) {
    let pid_list = pids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    set(prefix, &format!("Forked worker children {pid_list} at {at_epoch}"));
}

pub fn processing(prefix: &str, queue: &str, since_epoch: i64, class: &str) {
    set(prefix, &format!("Processing {queue} since {since_epoch} [{class}]"));
}

pub fn waiting(prefix: &str, queues: &[String]) {
    set(prefix, &format!("Waiting for {}", queues.join(",")));
}

pub fn paused(prefix: &str) {
    set(prefix, "Paused");
}
