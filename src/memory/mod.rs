pub(crate) mod dynarray;
