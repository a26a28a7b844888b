pub mod channel;
pub mod error;
pub mod sink;
pub mod types;

pub use channel::*;
pub use error::*;
pub use sink::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::{
        Delivery, GroupReport, NotificationChannel, NotificationSinkKind, NotifyError, ReportSink,
        StdoutSink, TcpConnector,
    };
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_types() {
        let _ = TypeId::of::<NotifyError>();
        let _ = TypeId::of::<GroupReport>();
        let _ = TypeId::of::<Delivery>();
        let _ = TypeId::of::<NotificationSinkKind>();
        let _ = TypeId::of::<StdoutSink>();
        let _ = TypeId::of::<NotificationChannel<TcpConnector>>();
    }

    #[test]
    fn sinks_are_usable_as_trait_objects() {
        let sink: Box<dyn ReportSink> = Box::new(StdoutSink);
        assert_eq!(sink.kind(), NotificationSinkKind::Stdout);
    }
}
