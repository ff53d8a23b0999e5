pub mod keyvaluedata;
