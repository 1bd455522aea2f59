mod upload_files_test;
mod upload_tables_test;
mod workspace_staging_test;
