pub mod slots;
pub mod templates;

pub use slots::SlotService;
pub use templates::TemplateService;
