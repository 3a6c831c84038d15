mod reload_test;
