mod artifacts;
