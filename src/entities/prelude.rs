pub use super::albums::Entity as Albums;
pub use super::edges::Entity as Edges;
pub use super::images::Entity as Images;
