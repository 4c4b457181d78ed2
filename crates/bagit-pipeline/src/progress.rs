use std::fmt;
use std::sync::Arc;

/// One progress event: `item` is the `count`-th of `total` units of
/// `activity`. `total` is `None` when it is not known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub activity: String,
    pub item:     String,
    pub count:    u64,
    pub total:    Option<u64>,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{} {} ({}/{})", self.activity, self.item, self.count, total),
            None => write!(f, "{} {} ({})", self.activity, self.item, self.count),
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Send one event to `sink`, if there is one.
pub fn report(sink: &Option<ProgressFn>, activity: &str, item: &str, count: u64, total: Option<u64>) {
    if let Some(sink) = sink {
        sink(&Progress {
            activity: activity.to_string(),
            item: item.to_string(),
            count,
            total,
        });
    }
}
