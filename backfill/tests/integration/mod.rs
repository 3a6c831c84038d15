mod memsql_load_test;
