use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

/// 时延分桶上界（毫秒）：<50, <100, <250, <500, <1000, >=1000
const LATENCY_BOUNDS_MS: [u128; 5] = [50, 100, 250, 500, 1000];

#[derive(Default)]
struct MetricsState {
    session_init_ok: u64,
    session_init_err: u64,
    // 终态 -> 次数
    send_outcomes: BTreeMap<&'static str, u64>,
    // 赞助服务 RPC 方法 -> (成功, 失败)
    sponsor_calls: BTreeMap<&'static str, (u64, u64)>,
    sponsor_latency_sum_ms: u128,
    sponsor_hist_buckets: [u64; 6],
}

fn state() -> MutexGuard<'static, MetricsState> {
    let lock = METRICS.get_or_init(|| Mutex::new(MetricsState::default()));
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn inc_session_init(ok: bool) {
    let mut s = state();
    if ok {
        s.session_init_ok += 1;
    } else {
        s.session_init_err += 1;
    }
}

/// 记录一次发送的终态（"confirmed" / "failed"）
pub fn inc_send_outcome(outcome: &'static str) {
    *state().send_outcomes.entry(outcome).or_insert(0) += 1;
}

pub fn observe_sponsor_call(method: &'static str, latency_ms: u128, ok: bool) {
    let mut s = state();
    let entry = s.sponsor_calls.entry(method).or_insert((0, 0));
    if ok {
        entry.0 += 1;
    } else {
        entry.1 += 1;
    }

    s.sponsor_latency_sum_ms += latency_ms;
    let bucket = LATENCY_BOUNDS_MS
        .iter()
        .position(|bound| latency_ms < *bound)
        .unwrap_or(LATENCY_BOUNDS_MS.len());
    s.sponsor_hist_buckets[bucket] += 1;
}

pub fn render_prometheus() -> String {
    let s = state();
    let mut out = String::new();

    out.push_str("# HELP sponsorcore_session_init_total Session initializations\n");
    out.push_str("# TYPE sponsorcore_session_init_total counter\n");
    out.push_str(&format!(
        "sponsorcore_session_init_total{{result=\"ok\"}} {}\n",
        s.session_init_ok
    ));
    out.push_str(&format!(
        "sponsorcore_session_init_total{{result=\"err\"}} {}\n",
        s.session_init_err
    ));

    out.push_str("# HELP sponsorcore_send_total Sponsored sends per terminal outcome\n");
    out.push_str("# TYPE sponsorcore_send_total counter\n");
    for (outcome, count) in s.send_outcomes.iter() {
        out.push_str(&format!(
            "sponsorcore_send_total{{outcome=\"{}\"}} {}\n",
            outcome, count
        ));
    }

    out.push_str("# HELP sponsorcore_sponsor_requests_total Sponsor service RPC calls\n");
    out.push_str("# TYPE sponsorcore_sponsor_requests_total counter\n");
    for (method, (ok, err)) in s.sponsor_calls.iter() {
        out.push_str(&format!(
            "sponsorcore_sponsor_requests_total{{method=\"{}\",result=\"ok\"}} {}\n",
            method, ok
        ));
        out.push_str(&format!(
            "sponsorcore_sponsor_requests_total{{method=\"{}\",result=\"err\"}} {}\n",
            method, err
        ));
    }

    out.push_str("# HELP sponsorcore_sponsor_latency_ms_sum Sum of sponsor RPC latency in ms\n");
    out.push_str("# TYPE sponsorcore_sponsor_latency_ms_sum counter\n");
    out.push_str(&format!(
        "sponsorcore_sponsor_latency_ms_sum {}\n",
        s.sponsor_latency_sum_ms
    ));

    out.push_str("# HELP sponsorcore_sponsor_latency_ms_bucket Sponsor RPC latency histogram\n");
    out.push_str("# TYPE sponsorcore_sponsor_latency_ms_bucket histogram\n");
    for (i, bound) in LATENCY_BOUNDS_MS.iter().enumerate() {
        out.push_str(&format!(
            "sponsorcore_sponsor_latency_ms_bucket{{le=\"{}\"}} {}\n",
            bound, s.sponsor_hist_buckets[i]
        ));
    }
    // +Inf 桶
    out.push_str(&format!(
        "sponsorcore_sponsor_latency_ms_bucket{{le=\"+Inf\"}} {}\n",
        s.sponsor_hist_buckets.iter().sum::<u64>()
    ));

    out
}
