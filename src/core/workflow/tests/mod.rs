mod blocking_reason;
