mod slice_test;
