//! Pipeline and filter composition (L3): a [`Filter`] chain bound into a
//! [`layout::PipelineLayout`] template, instantiated per connection as a
//! [`instance::PipelineInstance`] and pooled on `StreamEnd`.

pub mod default_filters;
pub mod filter;
pub mod fork;
pub mod instance;
pub mod layout;
pub mod link;

pub use default_filters::{EchoFilter, SinkFilter};
pub use filter::{Filter, FilterIo};
pub use fork::ForkFilter;
pub use instance::PipelineInstance;
pub use layout::{PipelineLayout, PipelineType};
pub use link::LinkFilter;
