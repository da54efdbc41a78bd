/// Process plumbing shared by all binaries of the workspace.
pub mod helpers;
