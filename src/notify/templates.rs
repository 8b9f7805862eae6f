//! Message texts sent through the alert channel (Telegram HTML subset)

use std::fmt::Write;

use crate::common::types::{CachedTriggerState, SymbolPair, TriggerStatus};

/// Alert raised when a trigger's window count reaches its threshold
pub fn alert_text(pair: &SymbolPair, state: &CachedTriggerState, count: u64) -> String {
    format!(
        "🔔 <b>{pair}</b>\n\
         {count} {side} trades worth between <b>{min}</b> and <b>{max}</b> {quote} \
         within {period} sec\n\
         reference price: <b>{price}</b> {quote}",
        pair = pair,
        count = count,
        side = side_label(state),
        min = state.min_value,
        max = state.max_value,
        quote = pair.quote,
        period = state.period_seconds,
        price = state.reference_price,
    )
}

fn side_label(state: &CachedTriggerState) -> String {
    match state.side {
        crate::common::types::SideFilter::Both => "buy/sell".to_string(),
        side => side.to_string(),
    }
}

/// One block per trigger, in the order given
pub fn status_report(statuses: &[TriggerStatus]) -> String {
    if statuses.is_empty() {
        return "No active triggers".to_string();
    }

    let mut report = String::new();
    for status in statuses {
        // Writing into a String cannot fail
        let _ = write!(
            report,
            "\n✅<b>{}</b>\n\
             triggering count: <b>{}</b>\n\
             current count: <b>{}</b>\n\
             period, sec: <b>{}</b>\n\
             side: <b>{}</b>\n\
             all transactions count: <b>{}</b>\n",
            status.pair,
            status.params.max_count,
            status.count_in_period,
            status.params.period_seconds,
            status.params.side,
            status.total_count,
        );
    }
    report
}

pub fn startup_text(active_triggers: usize) -> String {
    format!("Trigger detector started, {} active triggers", active_triggers)
}
