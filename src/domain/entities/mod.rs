mod link;

pub use link::ShortLink;
