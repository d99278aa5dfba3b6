pub mod temp_upload;
