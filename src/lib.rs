mod body;
mod config;
mod error;
mod list;
mod quadtree;
mod rect;
mod world;

pub trait QuadtreeVisitor<K> {
    fn object(&mut self, key: K, rect: &Rect);
    fn leaf(&mut self, depth: u32, bounds: &Rect);
    fn branch(&mut self, depth: u32, bounds: &Rect);
}

pub use body::*;
pub use config::*;
pub use error::*;
pub use list::*;
pub use quadtree::*;
pub use rect::*;
pub use world::*;
