mod handler;
mod model;

pub use handler::{
    delete_artwork, get_artwork, list_public_artworks, my_artworks, public_profile,
    upload_artwork,
};
