use std::error::Error;

use vergen::{BuildBuilder, Emitter};
use vergen_git2::Git2Builder;

// `/status` reports VERGEN_GIT_SHA; the build timestamp goes into the startup log.
fn main() -> Result<(), Box<dyn Error>> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let git = Git2Builder::default().sha(true).dirty(true).build()?;

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&git)?
        .emit()?;

    Ok(())
}
