//! Async utilities around Tokio runtime.

use std::future::Future;
use std::io;


/// Block on the given future with a current-thread Tokio runtime with time and I/O 
/// enabled. This must not be called from within another runtime.
pub fn sync<F: Future>(future: F) -> io::Result<F::Output> {
    
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;

    Ok(rt.block_on(future))
    
}
