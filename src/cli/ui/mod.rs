mod device_view;
mod inspect_view;
mod interaction_view;
mod painter;
mod scan_view;
mod table;

pub(crate) use self::inspect_view::InspectReportView;
pub(crate) use self::interaction_view::{
    ButtonEventView, ConfigReportView, LedReportView, MicSummaryView,
};
pub(crate) use self::painter::Painter;
pub(crate) use self::scan_view::ScanResultView;
