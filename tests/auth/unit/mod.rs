mod test_lineage_properties;
