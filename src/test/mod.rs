mod interface;
